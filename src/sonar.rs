// src/sonar.rs

use crate::strategy::QualityAnalyzer;
use crate::workspace::RepoSpec;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use git2::build::CheckoutBuilder;
use git2::Repository;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

const CONTAINER_NAME: &str = "sonar-scanner";
const PROPERTIES_FILE: &str = "sonar-project.properties";
const SCANNER_CACHE: &str = "/tmp/scanner-cache";

/// Vendored, generated and non-Go sources are kept out of the scan
const EXCLUSIONS: &str = "**/vendor/**,**/*.pb.go,**/*generated*.go,**/*.cs,**/*.css,**/*.less,**/*.scss,**/*as,**/*.html,**/*.xhtml,**/*.cshtml,**/*.vbhtml,**/*.aspx,**/*.ascx,**/*.rhtml,**/*.erb,**/*.shtm,**/*.shtml,**/*.jsp,**/*.jspf,**/*.jspx,**/*.java,**/*.jav,**/*.js,**/*.jsx,**/*.vue,**/*.kt,**/*php,**/*php3,**/*php4,**/*php5,**/*phtml,**/*inc,**/*py,**/*.rb,**/*.scala,**/*.ts,**/*.tsx,**/*.vb,**/*.xml,**/*.xsd,**/*.xsl,**/*_gen.go";

/// Where scans are sent and which scanner runs them
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub host_url: String,
    pub token: String,
    pub image: String,
    /// Container runtime executable
    pub docker: String,
}

/// Runs sonar-scanner in a container against a working copy
#[derive(Debug)]
pub struct SonarScanner {
    project_key: String,
    project_dir: PathBuf,
    settings: ScannerSettings,
}

impl SonarScanner {
    pub fn new(repo: &RepoSpec, settings: &ScannerSettings, project_dir: PathBuf) -> Self {
        SonarScanner {
            project_key: repo.project_key(),
            project_dir,
            settings: settings.clone(),
        }
    }

    fn scan_args(&self, version: &str, date: NaiveDate, contributors: usize) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            CONTAINER_NAME.into(),
            "--network".into(),
            "host".into(),
            "-dit".into(),
            "-v".into(),
            format!("{}:/root/src", self.project_dir.display()),
            "-v".into(),
            format!("{}:/root/.sonar/cache", SCANNER_CACHE),
            self.settings.image.clone(),
        ];

        let properties = [
            ("sonar.scm.disabled", "True".to_string()),
            ("sonar.host.url", self.settings.host_url.clone()),
            ("sonar.projectKey", self.project_key.clone()),
            ("sonar.projectBaseDir", "/root/src".to_string()),
            ("sonar.login", self.settings.token.clone()),
            ("sonar.projectVersion", version.to_string()),
            ("sonar.projectDate", date.format("%Y-%m-%d").to_string()),
            ("sonar.analysis.contributors", contributors.to_string()),
            ("sonar.exclusions", EXCLUSIONS.to_string()),
        ];
        for (key, value) in properties {
            args.push("-D".into());
            args.push(format!("{}={}", key, value));
        }
        args
    }

    fn docker<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new(&self.settings.docker)
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .with_context(|| format!("Failed to execute {}", self.settings.docker))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            bail!("{} exited with {}: {}", self.settings.docker, output.status, text.trim());
        }
        Ok(text)
    }

    fn remove_properties(&self) -> Result<()> {
        match fs::remove_file(self.project_dir.join(PROPERTIES_FILE)) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to remove {}", PROPERTIES_FILE))
            }
            _ => Ok(()),
        }
    }

    /// Brings back a tracked properties file removed before the scan.
    fn restore_properties(&self) -> Result<()> {
        let repo = Repository::open(&self.project_dir)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force().path(PROPERTIES_FILE)))?;
        Ok(())
    }

    fn wait_for_scanner(&self) -> Result<()> {
        let status = self.docker(["wait", CONTAINER_NAME]).context("Failed waiting for scanner to finish")?;
        let exit_code = status.lines().next().unwrap_or_default().trim();

        if exit_code != "0" {
            let logs = self
                .docker(["logs", CONTAINER_NAME])
                .with_context(|| format!("Scanner exited with {}, and its logs are unavailable", exit_code))?;
            bail!("Scanner exited with {}: {}", exit_code, logs.trim());
        }
        Ok(())
    }
}

impl QualityAnalyzer for SonarScanner {
    fn run(&mut self, version: &str, date: NaiveDate, contributors: usize) -> Result<()> {
        // A container left over from an interrupted scan blocks the name.
        if let Err(e) = self.docker(["rm", "-f", CONTAINER_NAME]) {
            debug!("No stale scanner container removed: {:#}", e);
        }

        self.remove_properties()?;
        self.docker(self.scan_args(version, date, contributors))
            .context("Failed to start scanner")?;

        let result = self.wait_for_scanner();

        if let Err(e) = self.docker(["rm", CONTAINER_NAME]) {
            warn!("Failed to remove scanner container: {:#}", e);
        }
        if let Err(e) = self.restore_properties() {
            debug!("Could not restore {}: {:#}", PROPERTIES_FILE, e);
        }

        result
    }

    /// Drops the scanner work directory, which is owned by the container user.
    fn finish(&mut self) {
        let mount = format!("{}:/root/src", self.project_dir.display());
        let args = [
            "run",
            "-i",
            "--rm",
            "--network",
            "host",
            "-v",
            mount.as_str(),
            "--entrypoint=",
            self.settings.image.as_str(),
            "rm",
            "-rf",
            "/root/src/.scannerwork",
        ];
        if let Err(e) = self.docker(args) {
            warn!("Failed to clean up scanner files: {:#}", e);
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Generates a fresh user token with basic credentials.
pub fn request_token(sonar_url: &str, user: &str, password: &str) -> Result<String> {
    let url = format!(
        "{}/api/user_tokens/generate?name={}&type=USER_TOKEN",
        sonar_url.trim_end_matches('/'),
        Uuid::new_v4()
    );
    let credentials = STANDARD.encode(format!("{}:{}", user, password));

    let agent = ureq::config::Config::builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let response = agent
        .post(url.as_str())
        .header("Authorization", format!("Basic {}", credentials))
        .send_empty()
        .with_context(|| format!("Failed to request a token from {}", sonar_url))?;

    let status = response.status().as_u16();
    if status != 200 {
        bail!("Failed to get a new token, status code from api: {}", status);
    }

    let body = response.into_body().read_to_string()?;
    parse_token(&body)
}

fn parse_token(body: &str) -> Result<String> {
    let response: TokenResponse =
        serde_json::from_str(body).context("Failed to decode the new token from api")?;
    Ok(response.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scanner(dir: PathBuf) -> SonarScanner {
        let settings = ScannerSettings {
            host_url: "http://127.0.0.1:9000".into(),
            token: "squ_secret".into(),
            image: "sonarsource/sonar-scanner-cli:4.7".into(),
            docker: "docker".into(),
        };
        let repo: RepoSpec = "acme/widget".parse().unwrap();
        SonarScanner::new(&repo, &settings, dir)
    }

    /// Scanner whose container runtime is a shell script logging its
    /// arguments to `calls.log`. `script_body` decides the exit status.
    #[cfg(unix)]
    fn scripted_scanner(dir: &std::path::Path, script_body: &str) -> Result<(SonarScanner, PathBuf)> {
        use std::os::unix::fs::PermissionsExt;

        let project_dir = dir.join("project");
        fs::create_dir_all(&project_dir)?;
        let calls = dir.join("calls.log");
        let script = dir.join("fake-docker");
        fs::write(
            &script,
            format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}\n", calls.display(), script_body),
        )?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        let mut scanner = scanner(project_dir);
        scanner.settings.docker = script.to_string_lossy().into_owned();
        Ok((scanner, calls))
    }

    #[cfg(unix)]
    fn recorded_commands(calls: &std::path::Path) -> Result<Vec<String>> {
        let text = fs::read_to_string(calls)?;
        Ok(text
            .lines()
            .map(|l| l.split_whitespace().take(3).collect::<Vec<_>>().join(" "))
            .collect())
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_start_does_not_block_next_scan() -> Result<()> {
        let dir = tempdir()?;
        let (mut scanner, calls) = scripted_scanner(
            dir.path(),
            r#"case "$1" in run) echo "name already in use" >&2; exit 1;; esac"#,
        )?;
        let date = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap();

        assert!(scanner.run("0123abcd", date, 1).is_err());
        assert!(scanner.run("4567ef01", date, 1).is_err());

        assert_eq!(
            recorded_commands(&calls)?,
            vec![
                "rm -f sonar-scanner",
                "run --name sonar-scanner",
                "rm -f sonar-scanner",
                "run --name sonar-scanner",
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_run_clears_stale_container_then_scans() -> Result<()> {
        let dir = tempdir()?;
        let (mut scanner, calls) = scripted_scanner(
            dir.path(),
            r#"case "$1" in rm) [ "$2" = "-f" ] && exit 1;; wait) echo 0;; esac"#,
        )?;

        scanner.run("0123abcd", NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(), 2)?;

        assert_eq!(
            recorded_commands(&calls)?,
            vec!["rm -f sonar-scanner", "run --name sonar-scanner", "wait sonar-scanner", "rm sonar-scanner"]
        );
        Ok(())
    }

    #[test]
    fn test_scan_args() {
        let scanner = scanner(PathBuf::from("/work/acme/widget"));
        let args = scanner.scan_args("0123abcd", NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(), 4);

        assert_eq!(&args[..3], &["run", "--name", "sonar-scanner"]);
        assert!(args.contains(&"/work/acme/widget:/root/src".to_string()));
        assert!(args.contains(&"sonarsource/sonar-scanner-cli:4.7".to_string()));
        for expected in [
            "sonar.projectKey=acme:widget",
            "sonar.login=squ_secret",
            "sonar.projectVersion=0123abcd",
            "sonar.projectDate=2021-07-01",
            "sonar.analysis.contributors=4",
            "sonar.host.url=http://127.0.0.1:9000",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }

        let image_pos = args.iter().position(|a| a == "sonarsource/sonar-scanner-cli:4.7").unwrap();
        let first_property = args.iter().position(|a| a == "-D").unwrap();
        assert!(image_pos < first_property);
    }

    #[test]
    fn test_remove_properties_tolerates_missing_file() -> Result<()> {
        let dir = tempdir()?;
        let scanner = scanner(dir.path().to_path_buf());
        scanner.remove_properties()?;

        fs::write(dir.path().join(PROPERTIES_FILE), "sonar.projectKey=other")?;
        scanner.remove_properties()?;
        assert!(!dir.path().join(PROPERTIES_FILE).exists());
        Ok(())
    }

    #[test]
    fn test_parse_token() -> Result<()> {
        let token = parse_token(r#"{"login":"admin","name":"x","token":"squ_123","createdAt":"2024-01-01"}"#)?;
        assert_eq!(token, "squ_123");
        assert!(parse_token(r#"{"errors":[{"msg":"Unauthorized"}]}"#).is_err());
        assert!(parse_token("not json").is_err());
        Ok(())
    }
}
