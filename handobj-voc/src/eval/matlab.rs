use super::*;
use crate::{common::*, config::MatlabConfig};

/// Invocation of the official MATLAB devkit evaluation.
#[derive(Debug, Clone)]
pub struct MatlabEval {
    pub matlab: PathBuf,
    pub wrapper_dir: PathBuf,
    pub devkit_path: PathBuf,
    pub run_id: RunId,
    pub image_set: String,
    pub output_dir: PathBuf,
}

impl MatlabEval {
    pub fn new(
        config: &MatlabConfig,
        devkit_path: impl Into<PathBuf>,
        run_id: RunId,
        image_set: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            matlab: config.command.clone(),
            wrapper_dir: config.wrapper_dir.clone(),
            devkit_path: devkit_path.into(),
            run_id,
            image_set: image_set.into(),
            output_dir: output_dir.into(),
        }
    }

    /// The statement passed to `-r`.
    pub fn script(&self) -> String {
        format!(
            "dbstop if error; voc_eval('{}','{}','{}','{}'); quit;",
            self.devkit_path.display(),
            self.run_id,
            self.image_set,
            self.output_dir.display()
        )
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "-nodisplay".into(),
            "-nodesktop".into(),
            "-r".into(),
            self.script(),
        ]
    }

    /// The command running in the wrapper directory.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.matlab);
        command.args(self.args()).current_dir(&self.wrapper_dir);
        command
    }

    /// Human readable command line.
    pub fn command_line(&self) -> String {
        format!(
            "cd {} && {} -nodisplay -nodesktop -r \"{}\"",
            self.wrapper_dir.display(),
            self.matlab.display(),
            self.script()
        )
    }

    /// Run MATLAB and wait for it to exit.
    pub fn run(&self) -> Result<ExitStatus> {
        info!("running: {}", self.command_line());
        let status = self
            .command()
            .status()
            .with_context(|| format!("failed to execute '{}'", self.matlab.display()))?;
        Ok(status)
    }
}
