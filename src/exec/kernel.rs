// src/exec/kernel.rs

//! Jupyter kernels driven through a small Python bridge.
//!
//! The bridge starts the kernel with `jupyter_client` and speaks the same
//! framed protocol as the REPL drivers, plus an interrupt control line that
//! is forwarded to the kernel. Workers are keyed by kernel name, so every
//! item of a group talks to one kernel.

use std::path::Path;

use crate::exec::persistent::LaunchSpec;

const JUPYTER_BRIDGE: &str = include_str!("drivers/jupyter_bridge.py");

/// Launch description for a kernel bridge.
///
/// `extra_switches` are handed to the kernel process, e.g. a Julia
/// `--sysimage=` switch. `conda_exe` is exported as `CONDA_EXE` so kernel
/// specs of conda environments can activate them.
pub fn kernel_launch(
    python: &Path,
    kernel_name: &str,
    extra_switches: &[String],
    conda_exe: Option<&str>,
) -> LaunchSpec {
    let mut args = vec![
        "-u".to_string(),
        "-c".to_string(),
        JUPYTER_BRIDGE.to_string(),
        kernel_name.to_string(),
    ];
    args.extend(extra_switches.iter().cloned());

    let mut env = vec![("PYTHONIOENCODING".to_string(), "utf-8".to_string())];
    if let Some(conda) = conda_exe {
        env.push(("CONDA_EXE".to_string(), conda.to_string()));
    }

    LaunchSpec {
        program: python.to_string_lossy().into_owned(),
        args,
        env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_name_and_switches_follow_the_bridge_source() {
        let launch = kernel_launch(
            Path::new("/usr/bin/python3"),
            "julia-1.10",
            &["--sysimage=/opt/sys.so".to_string()],
            Some("/opt/conda/bin/conda"),
        );
        assert_eq!(launch.args[0], "-u");
        assert_eq!(launch.args[3], "julia-1.10");
        assert_eq!(launch.args[4], "--sysimage=/opt/sys.so");
        assert!(launch
            .env
            .contains(&("CONDA_EXE".to_string(), "/opt/conda/bin/conda".to_string())));
    }
}
