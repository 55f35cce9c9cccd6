//! `faceid setup`: prepare a workstation to run the verification service.

use anyhow::{Context, Result};
use faceid_core::analysis::{DETECTION_MODEL_FILE, RECOGNITION_MODEL_FILE};
use faceid_core::ModelPack;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const MODEL_PACK_URL: &str = "https://github.com/deepinsight/insightface/releases/tag/v0.7";

pub struct SetupOptions {
    pub model_dir: PathBuf,
    pub model_name: String,
    /// Value of `FACEID_CONFIG`, if any.
    pub config_file: Option<PathBuf>,
    /// Value of `ORT_LIB_LOCATION`/`ORT_DYLIB_PATH`, if any.
    pub runtime_location: Option<String>,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Present,
    Missing,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub label: &'static str,
    pub path: Option<PathBuf>,
    pub status: CheckStatus,
}

#[derive(Debug)]
pub struct SetupReport {
    pub pack_dir: PathBuf,
    pub created_dir: bool,
    pub checks: Vec<Check>,
}

impl SetupReport {
    pub fn models_ready(&self) -> bool {
        self.checks
            .iter()
            .filter(|c| c.label != "Configuration file")
            .all(|c| c.status == CheckStatus::Present)
    }
}

pub fn run_setup(opts: &SetupOptions, input: &mut impl BufRead, out: &mut impl Write) -> Result<SetupReport> {
    writeln!(out, "faceid {}", env!("CARGO_PKG_VERSION"))?;
    match &opts.runtime_location {
        Some(location) => writeln!(out, "ONNX Runtime: system library at {location}")?,
        None => writeln!(out, "ONNX Runtime: prebuilt binaries linked at build time")?,
    }
    let provider = if cfg!(feature = "cuda") { "CUDA, CPU fallback" } else { "CPU" };
    writeln!(out, "Execution provider: {provider}")?;
    writeln!(out)?;

    writeln!(out, "WARNING: face analysis needs the native ONNX Runtime library.")?;
    writeln!(out, "If the server fails to start with a runtime load error, see docs/TROUBLESHOOTING.md.")?;
    if opts.assume_yes {
        writeln!(out, "Continuing (--yes).")?;
    } else {
        write!(out, "Press Enter to continue...")?;
        out.flush()?;
        let mut line = String::new();
        input.read_line(&mut line).context("failed to read confirmation")?;
    }
    writeln!(out)?;

    let pack_dir = opts.model_dir.join(&opts.model_name);
    let created_dir = if pack_dir.is_dir() {
        writeln!(out, "Model directory already exists: {}", pack_dir.display())?;
        false
    } else {
        std::fs::create_dir_all(&pack_dir).with_context(|| format!("failed to create {}", pack_dir.display()))?;
        writeln!(out, "Created model directory: {}", pack_dir.display())?;
        true
    };
    writeln!(out)?;

    let checks = check_installation(&opts.model_dir, &opts.model_name, opts.config_file.as_deref());
    let total = checks.len();
    for (i, check) in checks.iter().enumerate() {
        let status = match check.status {
            CheckStatus::Present => "ok",
            CheckStatus::Missing => "MISSING",
            CheckStatus::NotConfigured => "not set, built-in defaults apply",
        };
        match &check.path {
            Some(path) => writeln!(out, "[{}/{total}] {}: {status} ({})", i + 1, check.label, path.display())?,
            None => writeln!(out, "[{}/{total}] {}: {status}", i + 1, check.label)?,
        }
    }
    writeln!(out)?;

    let report = SetupReport {
        pack_dir,
        created_dir,
        checks,
    };

    if report.models_ready() {
        writeln!(out, "Setup complete. Start the server with:")?;
    } else {
        writeln!(out, "Models are missing. Download the {} pack from", opts.model_name)?;
        writeln!(out, "  {MODEL_PACK_URL}")?;
        writeln!(
            out,
            "and place {DETECTION_MODEL_FILE} and {RECOGNITION_MODEL_FILE} in {}",
            report.pack_dir.display()
        )?;
        writeln!(out, "Then start the server with:")?;
    }
    writeln!(out, "  FACEID_MODEL_DIR={} faceidd --port 8000", opts.model_dir.display())?;

    Ok(report)
}

/// The four installation checks, in order.
pub fn check_installation(model_dir: &Path, model_name: &str, config_file: Option<&Path>) -> Vec<Check> {
    let pack = ModelPack::locate(model_dir, model_name);
    let pack_dir = model_dir.join(model_name);

    let file_check = |label, path: PathBuf| {
        let status = if path.is_file() { CheckStatus::Present } else { CheckStatus::Missing };
        Check {
            label,
            path: Some(path),
            status,
        }
    };

    let dir_status = if pack_dir.is_dir() { CheckStatus::Present } else { CheckStatus::Missing };
    let config_check = match config_file {
        Some(path) => file_check("Configuration file", path.to_path_buf()),
        None => Check {
            label: "Configuration file",
            path: None,
            status: CheckStatus::NotConfigured,
        },
    };

    vec![
        Check {
            label: "Model directory",
            path: Some(pack_dir),
            status: dir_status,
        },
        file_check("Detection model", pack.detection),
        file_check("Recognition model", pack.recognition),
        config_check,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(model_dir: &Path, assume_yes: bool) -> SetupOptions {
        SetupOptions {
            model_dir: model_dir.to_path_buf(),
            model_name: "buffalo_l".to_string(),
            config_file: None,
            runtime_location: None,
            assume_yes,
        }
    }

    fn run(opts: &SetupOptions, stdin: &str) -> (SetupReport, String) {
        let mut input = Cursor::new(stdin.as_bytes().to_vec());
        let mut output = Vec::new();
        let report = run_setup(opts, &mut input, &mut output).unwrap();
        (report, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_creates_model_directory_once() {
        let root = tempfile::tempdir().unwrap();
        let opts = options(root.path(), true);

        let (first, out) = run(&opts, "");
        assert!(first.created_dir);
        assert!(out.contains("Created model directory"));

        let (second, out) = run(&opts, "");
        assert!(!second.created_dir);
        assert!(out.contains("Model directory already exists"));

        let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_prompt_waits_for_enter() {
        let root = tempfile::tempdir().unwrap();
        let (_, out) = run(&options(root.path(), false), "\n");
        assert!(out.contains("Press Enter to continue..."));

        let (_, out) = run(&options(root.path(), true), "");
        assert!(!out.contains("Press Enter"));
        assert!(out.contains("Continuing (--yes)."));
    }

    #[test]
    fn test_checks_are_labeled_in_order() {
        let root = tempfile::tempdir().unwrap();
        let (report, out) = run(&options(root.path(), true), "");

        let labels: Vec<_> = report.checks.iter().map(|c| c.label).collect();
        assert_eq!(
            labels,
            ["Model directory", "Detection model", "Recognition model", "Configuration file"]
        );
        assert_eq!(report.checks[0].status, CheckStatus::Present);
        assert_eq!(report.checks[1].status, CheckStatus::Missing);
        assert_eq!(report.checks[3].status, CheckStatus::NotConfigured);
        assert!(out.contains("[1/4] Model directory: ok"));
        assert!(out.contains("[2/4] Detection model: MISSING"));
        assert!(out.contains("Models are missing."));
        assert!(!report.models_ready());
    }

    #[test]
    fn test_ready_when_models_present() {
        let root = tempfile::tempdir().unwrap();
        let pack_dir = root.path().join("buffalo_l");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join(DETECTION_MODEL_FILE), b"onnx").unwrap();
        std::fs::write(pack_dir.join(RECOGNITION_MODEL_FILE), b"onnx").unwrap();

        let mut opts = options(root.path(), true);
        opts.config_file = Some(root.path().join("faceid.toml"));
        let (report, out) = run(&opts, "");

        assert!(report.models_ready());
        assert_eq!(report.checks[3].status, CheckStatus::Missing);
        assert!(out.contains("Setup complete."));
    }
}
