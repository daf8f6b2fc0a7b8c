//! Pkl compiler backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use stackhook_core::{Compiler, Error, Result};
use tokio::process::Command;
use tracing::debug;

use crate::process::run;

/// Evaluates `.pkl` sources to YAML with the `pkl` CLI.
pub struct PklCompiler {
    pkl_bin: String,
    timeout: Duration,
}

impl PklCompiler {
    pub fn new(pkl_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pkl_bin: pkl_bin.into(),
            timeout,
        }
    }

    fn eval_args(source: &Path, branch: &str) -> Vec<String> {
        vec![
            "eval".to_string(),
            source.to_string_lossy().into_owned(),
            "--format".to_string(),
            "yaml".to_string(),
            "--property".to_string(),
            format!("branch={}", branch),
        ]
    }
}

#[async_trait]
impl Compiler for PklCompiler {
    async fn compile(&self, source: &Path, branch: &str) -> Result<Vec<u8>> {
        debug!(source = %source.display(), branch = %branch, "Evaluating pkl");

        let mut cmd = Command::new(&self.pkl_bin);
        cmd.args(Self::eval_args(source, branch));
        if let Some(dir) = source.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        // Output may be a secret bundle; it is returned, never logged.
        let output = run(&mut cmd, "pkl eval", self.timeout)
            .await
            .map_err(|e| e.into_error(Error::Compile))?;
        Ok(output.stdout)
    }
}
