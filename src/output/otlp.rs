use log::{debug, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::Token;
use crate::error::{PipeSpanError, Result};
use crate::timeline::attributes::{self as attr, AttributeValue};
use crate::timeline::ids::TraceId;
use crate::timeline::trace::{SpanKind, SpanSink, SpanStatus, TraceSpan};

pub const LOCAL_ENDPOINT: &str = "http://localhost:4318/v1/traces";
pub const LOCAL_VIEWER: &str = "http://localhost:16686/trace/";
pub const SWO_ENDPOINT: &str = "https://otel.collector.na-01.cloud.solarwinds.com/v1/traces";
pub const SWO_VIEWER: &str = "https://my.na-01.cloud.solarwinds.com/";
pub const DEFAULT_SERVICE_NAME: &str = "gitlab pipelines";

/// Spans per export request.
const BATCH_SIZE: usize = 512;

/// Where traces are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TraceDestination {
    /// A collector on this machine (e.g. Jaeger all-in-one)
    #[default]
    Local,
    /// SolarWinds Observability
    Swo,
}

/// Resolved export endpoint for one destination.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub destination: TraceDestination,
    pub endpoint: Url,
    pub bearer: Option<Token>,
    /// Base URL the trace id is appended to for display
    pub viewer: Option<String>,
}

impl ExportTarget {
    pub fn viewer_url(&self, trace_id: &TraceId) -> Option<String> {
        self.viewer.as_ref().map(|base| format!("{base}{trace_id}"))
    }
}

/// Collects spans and posts them as OTLP/HTTP JSON on [`shutdown`].
///
/// [`shutdown`]: OtlpExporter::shutdown
pub struct OtlpExporter {
    client: reqwest::Client,
    target: ExportTarget,
    service_name: String,
    scope_name: String,
    buffer: Vec<TraceSpan>,
}

impl SpanSink for OtlpExporter {
    fn record(&mut self, span: TraceSpan) {
        self.buffer.push(span);
    }
}

impl OtlpExporter {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(target: ExportTarget, service_name: &str, scope_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pipespan/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            target,
            service_name: service_name.to_string(),
            scope_name: scope_name.to_string(),
            buffer: Vec::new(),
        })
    }

    pub fn target(&self) -> &ExportTarget {
        &self.target
    }

    /// Sends every buffered span and releases the exporter.
    ///
    /// Returns the number of spans exported.
    ///
    /// # Errors
    ///
    /// Returns [`PipeSpanError::ExportEncoding`] before anything is sent if a
    /// span cannot be encoded, otherwise an error on the first batch the
    /// collector rejects or that cannot be sent. Later batches are not
    /// attempted.
    pub async fn shutdown(self) -> Result<usize> {
        let total = self.buffer.len();
        info!(
            "Exporting {total} spans to {} ({:?})",
            self.target.endpoint, self.target.destination
        );

        let batches = self
            .buffer
            .chunks(BATCH_SIZE)
            .map(|batch| export_request(&self.service_name, &self.scope_name, batch))
            .collect::<Result<Vec<_>>>()?;

        for (index, payload) in batches.iter().enumerate() {
            debug!("Sending batch {} of {}", index + 1, batches.len());
            self.send(payload).await?;
        }

        Ok(total)
    }

    async fn send(&self, payload: &ExportTraceServiceRequest<'_>) -> Result<()> {
        let mut request = self
            .client
            .post(self.target.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(token) = &self.target.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.as_str()));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(PipeSpanError::Export {
            status: status.as_u16(),
            message,
        })
    }
}

// OTLP/HTTP JSON encoding. Ids are hex strings and 64-bit integers are
// decimal strings, per the protobuf JSON mapping.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportTraceServiceRequest<'a> {
    resource_spans: Vec<ResourceSpans<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans<'a> {
    resource: Resource<'a>,
    scope_spans: Vec<ScopeSpans<'a>>,
}

#[derive(Debug, Serialize)]
struct Resource<'a> {
    attributes: Vec<KeyValue<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeSpans<'a> {
    scope: Scope<'a>,
    spans: Vec<OtlpSpan<'a>>,
}

#[derive(Debug, Serialize)]
struct Scope<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpSpan<'a> {
    trace_id: &'a str,
    span_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<&'a str>,
    name: &'a str,
    kind: u8,
    start_time_unix_nano: String,
    end_time_unix_nano: String,
    attributes: Vec<KeyValue<'a>>,
    status: Status<'a>,
}

#[derive(Debug, Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: AnyValue<'a>,
}

#[derive(Debug, Serialize)]
enum AnyValue<'a> {
    #[serde(rename = "stringValue")]
    String(&'a str),
    #[serde(rename = "intValue")]
    Int(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "boolValue")]
    Bool(bool),
}

#[derive(Debug, Serialize)]
struct Status<'a> {
    code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

fn any_value(value: &AttributeValue) -> AnyValue<'_> {
    match value {
        AttributeValue::String(s) => AnyValue::String(s),
        AttributeValue::Int(i) => AnyValue::Int(i.to_string()),
        AttributeValue::Double(d) => AnyValue::Double(*d),
        AttributeValue::Bool(b) => AnyValue::Bool(*b),
    }
}

fn kind_code(kind: SpanKind) -> u8 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
    }
}

/// Nanoseconds since the epoch; only 1677-09-21 to 2262-04-11 fit.
fn unix_nanos(span: &TraceSpan, at: chrono::DateTime<chrono::Utc>) -> Result<String> {
    at.timestamp_nanos_opt()
        .map(|nanos| nanos.to_string())
        .ok_or_else(|| {
            PipeSpanError::ExportEncoding(format!(
                "span '{}' has a timestamp outside the OTLP range: {at}",
                span.name
            ))
        })
}

fn otlp_span(span: &TraceSpan) -> Result<OtlpSpan<'_>> {
    let status = match &span.status {
        SpanStatus::Unset => Status {
            code: 0,
            message: None,
        },
        SpanStatus::Error { message } => Status {
            code: 2,
            message: message.as_deref(),
        },
    };

    Ok(OtlpSpan {
        trace_id: span.trace_id.as_str(),
        span_id: span.span_id.as_str(),
        parent_span_id: span.parent_span_id.as_ref().map(|id| id.as_str()),
        name: &span.name,
        kind: kind_code(span.kind),
        start_time_unix_nano: unix_nanos(span, span.start)?,
        end_time_unix_nano: unix_nanos(span, span.end)?,
        attributes: span
            .attributes
            .iter()
            .map(|(key, value)| KeyValue {
                key: *key,
                value: any_value(value),
            })
            .collect(),
        status,
    })
}

fn export_request<'a>(
    service_name: &'a str,
    scope_name: &'a str,
    spans: &'a [TraceSpan],
) -> Result<ExportTraceServiceRequest<'a>> {
    Ok(ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Resource {
                attributes: vec![KeyValue {
                    key: attr::SERVICE_NAME,
                    value: AnyValue::String(service_name),
                }],
            },
            scope_spans: vec![ScopeSpans {
                scope: Scope { name: scope_name },
                spans: spans.iter().map(otlp_span).collect::<Result<_>>()?,
            }],
        }],
    })
}
