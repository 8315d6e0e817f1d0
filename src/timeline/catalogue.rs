//! The ordered set of CI phases recognized in job logs.
//!
//! Order matters: it is the left-to-right order in which the phases of a job
//! appear on the chart. Every pattern runs in multi-line mode against a full
//! GitLab job log where each line starts with the runner's timestamp.

use std::sync::LazyLock;

use super::span::SpanPattern;

/// Start timestamp of the line the pattern anchors on.
const START: &str = r"^(?P<start>[^\n]+?Z)";

fn pattern(name: &'static str, body: &str) -> SpanPattern {
    SpanPattern::new(name, &format!("(?m){body}"))
        .unwrap_or_else(|e| panic!("span pattern '{name}' is invalid: {e}"))
}

pub static CATALOGUE: LazyLock<Vec<SpanPattern>> = LazyLock::new(|| {
    vec![
        // docker executor setup
        pattern(
            "docker",
            &format!(
                r#"{START} [^\n]+?Preparing the "docker" executor(?s:.)+?^(?P<end>[^\n]+?Z) [^\n]+?Using docker image "#
            ),
        ),
        // cloning
        pattern(
            "git",
            &format!(
                r"{START}[^\n]*?Getting source from Git repository[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*?(?:Removing|section_end:)"
            ),
        ),
        // cleaning the previous checkout
        pattern(
            "rm",
            &format!(
                r"(?P<body>{START}[^\n]*? Removing [^\n]*\n(?:[^\n]*\n)*[^\n]+Removing[^\n]*)\n^(?P<end>[^\n]+?Z)"
            ),
        ),
        pattern(
            "download_artifacts",
            &format!(
                r"{START}[^\n]*?section_start:\d+:download_artifacts(?:\r|$)[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*?section_end:\d+:download_artifacts(?:\r|$)"
            ),
        )
        .with_tag("artifacts"),
        pattern(
            "apt",
            &format!(
                r"{START}[^\n]*?apt-get[\s\-a-zA-Z]+update(?:[^\n]*\n)*[^\n]*(?:01E debconf|apt-get)[^\n]*\n^(?P<end>[^\n]+?Z)"
            ),
        ),
        // Ends at the last `npm` line that is not `npm run`, or at the very
        // next line when npm printed nothing else.
        pattern(
            "npm",
            &format!(
                r"{START} [^\n]+?\$ npm (?:ci|clean-install|install-clean)\b[^\n]*\n(?:(?s:.)*^(?P<end>[^\n]+?Z) npm (?:[^r\n]|r[^u\n]|ru[^n\n])|^(?P<end_alt>[^\n]+?Z) )"
            ),
        ),
        pattern(
            "serverless",
            &format!(
                r"{START}[^\n]*?> sls package[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*✔ Service packaged"
            ),
        ),
        pattern(
            "esbuild",
            &format!(
                r"{START}[^\n]*?(?:node esbuild\.mjs|> esbuild)[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*⚡\s+[^\n]*Done in "
            ),
        ),
        pattern(
            "next_build",
            &format!(
                r"{START}[^\n]*?> next build[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*prerendered as static content(?:\r|$)"
            ),
        ),
        pattern(
            "eslint",
            &format!(
                r"{START} [^\n]*?\beslint\b[^\n]*\n(?:[^\n]*\n)*^(?P<end>[^\n]+?Z) [^\n]*\b(?:problems \(\d|[^\n]*\bNo problems found\b)"
            ),
        ),
        pattern(
            "upload_artifacts",
            &format!(
                r"{START}[^\n]*?section_start:\d+:upload_artifacts_on_success[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*?section_end:\d+:upload_artifacts_on_success"
            ),
        )
        .with_tag("artifacts"),
        // teardown before "Job succeeded"
        pattern(
            "wait",
            &format!(
                r"{START}[^\n]*?00O\+\x1b?\[0K(?:\r|$)[^\n]*\n(?:[^\n]*\n)*?^(?P<end>[^\n]+?Z)[^\n]*?Job succeeded"
            ),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::span::log_search;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn find(name: &str) -> &'static SpanPattern {
        CATALOGUE
            .iter()
            .find(|p| p.name() == name)
            .unwrap_or_else(|| panic!("no pattern named {name}"))
    }

    #[test]
    fn test_catalogue_compiles_in_order() {
        let names: Vec<_> = CATALOGUE.iter().map(SpanPattern::name).collect();
        assert_eq!(
            names,
            vec![
                "docker",
                "git",
                "rm",
                "download_artifacts",
                "apt",
                "npm",
                "serverless",
                "esbuild",
                "next_build",
                "eslint",
                "upload_artifacts",
                "wait",
            ]
        );
    }

    #[test]
    fn test_artifact_patterns_share_a_tag() {
        assert_eq!(find("download_artifacts").tag(), "artifacts");
        assert_eq!(find("upload_artifacts").tag(), "artifacts");
        assert_eq!(find("npm").tag(), "npm");

        let mut tags: Vec<&str> = CATALOGUE.iter().map(SpanPattern::tag).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.iter().filter(|t| **t == "artifacts").count(), 1);
        assert_eq!(tags.len(), CATALOGUE.len() - 1);
    }

    #[test]
    fn test_git_clone() {
        let log = "2024-01-01T10:00:00.000Z 00O Getting source from Git repository\n\
                   2024-01-01T10:00:01.000Z 00O Fetching changes with git depth set to 20...\n\
                   2024-01-01T10:00:04.000Z 00O Checking out 1a2b3c4d as detached HEAD\n\
                   2024-01-01T10:00:05.000Z 00O Removing node_modules/\n";

        let span = log_search(find("git"), log).unwrap();
        assert_eq!(span.start, at(10, 0, 0));
        assert_eq!(span.end, at(10, 0, 5));
    }

    #[test]
    fn test_rm_captures_explicit_body() {
        let log = "2024-01-01T10:00:05.000Z 00O Removing node_modules/\n\
                   2024-01-01T10:00:06.000Z 00O Removing dist/\n\
                   2024-01-01T10:00:09.000Z 00O Skipping Git submodules setup\n";

        let span = log_search(find("rm"), log).unwrap();
        assert_eq!(span.start, at(10, 0, 5));
        assert_eq!(span.end, at(10, 0, 9));
        assert!(span.body.ends_with("Removing dist/"));
        assert!(!span.body.contains("Skipping"));
    }

    #[test]
    fn test_download_artifacts_section() {
        let log = "2024-01-01T10:01:00.000Z 00O section_start:1704103260:download_artifacts\r\x1b[0K\x1b[0K\x1b[36;1mDownloading artifacts\x1b[0;m\n\
                   2024-01-01T10:01:02.000Z 00O Downloading artifacts for build (123)...\n\
                   2024-01-01T10:01:30.000Z 00O section_end:1704103290:download_artifacts\r\x1b[0K\n";

        let span = log_search(find("download_artifacts"), log).unwrap();
        assert_eq!(span.name, "download_artifacts");
        assert_eq!(span.tag, "artifacts");
        assert_eq!(span.start, at(10, 1, 0));
        assert_eq!(span.end, at(10, 1, 30));
    }

    #[test]
    fn test_apt_ends_after_last_apt_line() {
        let log = "2024-01-01T10:00:00.000Z 00O $ apt-get -qq update\n\
                   2024-01-01T10:00:04.000Z 00O Reading package lists...\n\
                   2024-01-01T10:00:05.000Z 00O $ apt-get install -y -qq jq\n\
                   2024-01-01T10:00:08.000Z 01E debconf: delaying package configuration\n\
                   2024-01-01T10:00:09.000Z 00O Setting up jq (1.6-2.1)\n\
                   2024-01-01T10:00:10.000Z 00O $ node --version\n";

        let span = log_search(find("apt"), log).unwrap();
        assert_eq!(span.start, at(10, 0, 0));
        assert_eq!(span.end, at(10, 0, 9));
    }

    #[test]
    fn test_npm_ends_at_last_non_run_npm_line() {
        let log = "2024-01-01T10:02:00.000Z 00O $ npm ci --prefer-offline\n\
                   2024-01-01T10:02:30.000Z 00O npm warn deprecated glob@7.2.3\n\
                   2024-01-01T10:03:10.000Z 00O added 1200 packages in 70s\n\
                   2024-01-01T10:03:11.000Z npm notice New minor version\n\
                   2024-01-01T10:03:20.000Z 00O $ npm run build\n\
                   2024-01-01T10:03:25.000Z npm run build\n";

        let span = log_search(find("npm"), log).unwrap();
        assert_eq!(span.start, at(10, 2, 0));
        assert_eq!(span.end, at(10, 3, 11));
    }

    #[test]
    fn test_npm_without_npm_lines_ends_at_next_line() {
        let log = "2024-01-01T10:02:00.000Z 00O $ npm ci\n\
                   2024-01-01T10:02:45.000Z 00O added 3 packages in 45s\n";

        let span = log_search(find("npm"), log).unwrap();
        assert_eq!(span.end, at(10, 2, 45));
    }

    #[test]
    fn test_esbuild() {
        let log = "2024-01-01T10:04:00.000Z 00O > esbuild src/index.ts --bundle\n\
                   2024-01-01T10:04:01.000Z 00O   dist/index.js  1.2mb\n\
                   2024-01-01T10:04:02.000Z 00O ⚡ Done in 812ms\n";

        let span = log_search(find("esbuild"), log).unwrap();
        assert_eq!(span.end, at(10, 4, 2));
    }

    #[test]
    fn test_serverless_package() {
        let log = "2024-01-01T10:00:30.000Z 00O > sls package --stage dev\r\x1b[0K\n\
                   2024-01-01T10:01:00.000Z 00O Packaging api for stage dev (us-east-1)\n\
                   2024-01-01T10:01:40.000Z 00O ✔ Service packaged (70s)\r\x1b[0K\n";

        let span = log_search(find("serverless"), log).unwrap();
        assert_eq!(span.start, at(10, 0, 30));
        assert_eq!(span.end, at(10, 1, 40));
    }

    #[test]
    fn test_next_build_ends_at_static_legend() {
        let log = "2024-01-01T10:02:00.000Z 00O > next build\n\
                   2024-01-01T10:02:30.000Z 00O    Creating an optimized production build ...\n\
                   2024-01-01T10:02:50.000Z 00O ○  (Static)  prerendered as static content\r\x1b[0K\n\
                   2024-01-01T10:02:51.000Z 00O section_end:1704103371:step_script\r\x1b[0K\n";

        let span = log_search(find("next_build"), log).unwrap();
        assert_eq!(span.start, at(10, 2, 0));
        assert_eq!(span.end, at(10, 2, 50));
    }

    #[test]
    fn test_next_build_legend_at_end_of_line() {
        let log = "2024-01-01T10:02:00.000Z 00O > next build\n\
                   2024-01-01T10:02:40.000Z 00O ○  (Static)  prerendered as static content\n";

        let span = log_search(find("next_build"), log).unwrap();
        assert_eq!(span.end, at(10, 2, 40));
    }

    #[test]
    fn test_eslint_problems() {
        let log = "2024-01-01T10:05:00.000Z 00O $ npx eslint .\n\
                   2024-01-01T10:05:40.000Z 00O /src/a.ts 1:1 error\n\
                   2024-01-01T10:05:41.000Z 00O ✖ 1 problems (1 error, 0 warnings)\n";

        let span = log_search(find("eslint"), log).unwrap();
        assert_eq!(span.start, at(10, 5, 0));
        assert_eq!(span.end, at(10, 5, 41));
    }

    #[test]
    fn test_upload_artifacts_section() {
        let log = "2024-01-01T10:03:00.000Z 00O section_start:1704103380:upload_artifacts_on_success\r\x1b[0K\x1b[0K\x1b[36;1mUploading artifacts for successful job\x1b[0;m\n\
                   2024-01-01T10:03:02.000Z 00O Uploading artifacts...\n\
                   2024-01-01T10:03:09.000Z 00O dist/: found 42 matching artifact files and directories\n\
                   2024-01-01T10:03:10.000Z 00O section_end:1704103390:upload_artifacts_on_success\r\x1b[0K\n";

        let span = log_search(find("upload_artifacts"), log).unwrap();
        assert_eq!(span.tag, "artifacts");
        assert_eq!(span.start, at(10, 3, 0));
        assert_eq!(span.end, at(10, 3, 10));
    }

    #[test]
    fn test_wait_before_job_succeeded() {
        let log = "2024-01-01T10:06:00.000Z 00O+\x1b[0K\n\
                   2024-01-01T10:06:01.000Z 00O Cleaning up project directory and file based variables\n\
                   2024-01-01T10:06:03.000Z 00O Job succeeded\n";

        let span = log_search(find("wait"), log).unwrap();
        assert_eq!(span.start, at(10, 6, 0));
        assert_eq!(span.end, at(10, 6, 3));
    }

    #[test]
    fn test_unrelated_log_matches_nothing() {
        let log = "2024-01-01T10:00:00.000Z 00O hello\n2024-01-01T10:00:01.000Z 00O world\n";
        assert!(CATALOGUE.iter().all(|p| log_search(p, log).is_none()));
    }
}
