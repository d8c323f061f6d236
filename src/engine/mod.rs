pub mod api;
pub mod health;
pub mod process;

use crate::model::ShellConfig;
use process::{ProcessSpec, COMMAND_ERROR_MARKER, STREAM_ERROR_MARKER};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the local backend interpreter is launched.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    interpreter: String,
    backend_dir: PathBuf,
    command_script: String,
    outline_script: String,
    timeout: Option<Duration>,
}

impl LocalBackend {
    pub fn new(cfg: &ShellConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            backend_dir: cfg.backend_dir.clone(),
            command_script: cfg.command_script.clone(),
            outline_script: cfg.outline_script.clone(),
            timeout: cfg.process_timeout,
        }
    }

    /// `<interpreter> <command script> <args...>` for the console channel.
    pub fn console_command(&self, args: Vec<String>) -> ProcessSpec {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.command_script.clone());
        argv.extend(args);
        ProcessSpec {
            program: self.interpreter.clone(),
            args: argv,
            cwd: self.backend_dir.clone(),
            error_marker: COMMAND_ERROR_MARKER,
            timeout: self.timeout,
        }
    }

    /// `<interpreter> <outline script> <pdf>` for the streaming outline channel.
    pub fn local_outline(&self, pdf: &Path) -> ProcessSpec {
        ProcessSpec {
            program: self.interpreter.clone(),
            args: vec![
                self.outline_script.clone(),
                pdf.to_string_lossy().into_owned(),
            ],
            cwd: self.backend_dir.clone(),
            error_marker: STREAM_ERROR_MARKER,
            timeout: self.timeout,
        }
    }
}
