// src/exec/backends.rs

//! Per-type preparation of tool instances.
//!
//! Each function turns a specification, an execution directory and the
//! final argument list into an [`ExecutionManager`]. Nothing is started here.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AppSettings;
use crate::errors::{ItemError, Result};
use crate::exec::instance::ExecutionManager;
use crate::exec::kernel::kernel_launch;
use crate::exec::persistent::{LaunchSpec, PersistentExecutionManager, PersistentPool};
use crate::exec::process::ProcessExecutionManager;
use crate::exec::programs;
use crate::resource::posix_string;
use crate::spec::{
    ExecutableSettings, ExecutionSettings, JuliaSettings, PythonSettings, ToolSpecification,
};

const PYTHON_REPL: &str = include_str!("drivers/python_repl.py");
const JULIA_REPL: &str = include_str!("drivers/julia_repl.jl");

/// Everything a back-end needs to prepare a run.
pub(crate) struct PrepareContext<'a> {
    pub spec: &'a ToolSpecification,
    pub basedir: &'a Path,
    pub settings: &'a AppSettings,
    pub pool: &'a Arc<PersistentPool>,
    pub group_id: &'a str,
    pub kill_completed: bool,
}

impl PrepareContext<'_> {
    fn main_prgm(&self) -> Result<&str> {
        self.spec.main_prgm().ok_or_else(|| {
            ItemError::PrepareFailed(format!(
                "specification '{}' has no main program file",
                self.spec.name()
            ))
        })
    }

    fn persistent(&self, launch: LaunchSpec, commands: Vec<String>) -> ExecutionManager {
        ExecutionManager::Persistent(PersistentExecutionManager {
            pool: Arc::clone(self.pool),
            launch,
            group_id: self.group_id.to_string(),
            commands,
            kill_after: self.kill_completed,
        })
    }
}

pub(crate) fn prepare_gams(
    ctx: &PrepareContext<'_>,
    args: Vec<String>,
) -> Result<ExecutionManager> {
    let gams = programs::gams(ctx.settings).ok_or_else(|| {
        ItemError::PrerequisiteMissing("GAMS executable not found".to_string())
    })?;
    let main = ctx.main_prgm()?;
    let mut argv = vec![
        main.to_string(),
        format!("curDir={}", ctx.basedir.display()),
        "logoption=3".to_string(),
    ];
    argv.extend(args);
    Ok(ExecutionManager::Process(ProcessExecutionManager::new(
        gams.to_string_lossy(),
        argv,
        ctx.basedir,
    )))
}

/// Write a GAMSIDE project file next to the program so the failed run can be
/// opened in the IDE. Returns the path of the file.
pub(crate) fn write_gams_project_file(spec: &ToolSpecification, basedir: &Path) -> Result<PathBuf> {
    let main = spec.main_prgm().unwrap_or_default();
    let main_path = basedir.join(main);
    let stem = Path::new(main)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| spec.short_name());
    let lst_path = main_path.with_extension("lst");
    let project_path = basedir.join(format!("{stem}_autocreated.gpr"));

    let contents = format!(
        "[PROJECT]\n\n\
         [OPENWINDOW_1]\n\
         FILE0={main}\n\
         FILE1={main}\n\
         MAXIM=1\n\
         TOP=50\n\
         LEFT=50\n\
         HEIGHT=400\n\
         WIDTH=400\n\n\
         [OPENWINDOW_2]\n\
         FILE0={lst}\n\
         FILE1={lst}\n\
         MAXIM=1\n\
         TOP=60\n\
         LEFT=60\n\
         HEIGHT=400\n\
         WIDTH=400\n",
        main = main_path.display(),
        lst = lst_path.display(),
    );
    fs::write(&project_path, contents)?;
    info!(path = ?project_path, "wrote GAMS project file");
    Ok(project_path)
}

pub(crate) fn prepare_julia(
    ctx: &PrepareContext<'_>,
    args: Vec<String>,
) -> Result<ExecutionManager> {
    let settings = match ctx.spec.execution_settings() {
        ExecutionSettings::Julia(s) => s.clone(),
        _ => JuliaSettings::default(),
    };
    let main = ctx.main_prgm()?;
    let sysimage = julia_sysimage(&settings, ctx.settings);

    if settings.use_jupyter_console {
        let kernel = require_kernel(&settings.kernel_spec_name, ctx.spec.name())?;
        let python = programs::python(ctx.settings, "").ok_or_else(|| {
            ItemError::PrerequisiteMissing(
                "Python interpreter for the Jupyter bridge not found".to_string(),
            )
        })?;
        let switches: Vec<String> = sysimage
            .iter()
            .map(|p| format!("--sysimage={}", p.display()))
            .collect();
        let launch = kernel_launch(&python, kernel, &switches, ctx.settings.conda());
        let command = julia_run_command(ctx.basedir, main, &args);
        return Ok(ctx.persistent(launch, vec![command]));
    }

    let julia = programs::julia(ctx.settings, &settings.executable).ok_or_else(|| {
        ItemError::PrerequisiteMissing("Julia executable not found".to_string())
    })?;
    let mut julia_args = Vec::new();
    let project = non_empty(&settings.project).or_else(|| ctx.settings.julia_project());
    if let Some(project) = project {
        julia_args.push(format!("--project={project}"));
    }
    if let Some(sysimage) = &sysimage {
        julia_args.push(format!("--sysimage={}", sysimage.display()));
    }

    if ctx.settings.tool.use_basic_julia_repl {
        julia_args.push(main.to_string());
        julia_args.extend(args);
        return Ok(ExecutionManager::Process(ProcessExecutionManager::new(
            julia.to_string_lossy(),
            julia_args,
            ctx.basedir,
        )));
    }

    julia_args.push("-e".to_string());
    julia_args.push(JULIA_REPL.to_string());
    let launch = LaunchSpec {
        program: julia.to_string_lossy().into_owned(),
        args: julia_args,
        env: Vec::new(),
    };
    let command = julia_run_command(ctx.basedir, main, &args);
    Ok(ctx.persistent(launch, vec![command]))
}

/// Sysimage switch value, only if the file exists.
fn julia_sysimage(settings: &JuliaSettings, app: &AppSettings) -> Option<PathBuf> {
    let configured = non_empty(&settings.sysimage).or_else(|| app.julia_sysimage())?;
    let path = PathBuf::from(configured);
    if path.is_file() {
        Some(path)
    } else {
        debug!(?path, "ignoring missing Julia sysimage");
        None
    }
}

/// `cd(dir); empty!(ARGS); append!(ARGS, [...]); include(main)`
pub(crate) fn julia_run_command(basedir: &Path, main: &str, args: &[String]) -> String {
    let args = args
        .iter()
        .map(|a| julia_string(a))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "cd({}); empty!(ARGS); append!(ARGS, String[{}]); include({})",
        julia_string(&posix_string(basedir)),
        args,
        julia_string(&posix_string(&basedir.join(main))),
    )
}

pub(crate) fn prepare_python(
    ctx: &PrepareContext<'_>,
    args: Vec<String>,
) -> Result<ExecutionManager> {
    let settings = match ctx.spec.execution_settings() {
        ExecutionSettings::Python(s) => s.clone(),
        _ => PythonSettings::default(),
    };
    let main = ctx.main_prgm()?;
    let python = programs::python(ctx.settings, &settings.executable).ok_or_else(|| {
        ItemError::PrerequisiteMissing("Python interpreter not found".to_string())
    })?;

    if settings.use_jupyter_console {
        let kernel = require_kernel(&settings.kernel_spec_name, ctx.spec.name())?;
        let conda = if settings.env == "conda" {
            ctx.settings.conda()
        } else {
            None
        };
        let launch = kernel_launch(&python, kernel, &[], conda);
        return Ok(ctx.persistent(launch, python_kernel_commands(ctx.basedir, main, &args)));
    }

    let launch = LaunchSpec {
        program: python.to_string_lossy().into_owned(),
        args: vec!["-u".to_string(), "-c".to_string(), PYTHON_REPL.to_string()],
        env: vec![("PYTHONIOENCODING".to_string(), "utf-8".to_string())],
    };
    Ok(ctx.persistent(launch, python_repl_commands(ctx.basedir, main, &args)))
}

/// `%cd` into the execution directory, then `%run` the main program.
pub(crate) fn python_kernel_commands(basedir: &Path, main: &str, args: &[String]) -> Vec<String> {
    let mut run = format!("%run {}", python_string(main));
    for arg in args {
        run.push(' ');
        run.push_str(&python_string(arg));
    }
    vec![
        format!("%cd -q {}", python_string(&posix_string(basedir))),
        run,
    ]
}

/// Statements that run the main program as `__main__` in the REPL.
pub(crate) fn python_repl_commands(basedir: &Path, main: &str, args: &[String]) -> Vec<String> {
    let full_path = python_string(&posix_string(&basedir.join(main)));
    let argv = std::iter::once(full_path.clone())
        .chain(args.iter().map(|a| python_string(a)))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        format!("import sys; sys.argv = [{argv}]"),
        format!("import os; os.chdir({})", python_string(&posix_string(basedir))),
        "globals_dict = globals()".to_string(),
        format!(r#"globals_dict.update({{"__file__": {full_path}, "__name__": "__main__"}})"#),
        format!(
            r#"with open({full_path}, "rb") as f: exec(compile(f.read(), {full_path}, "exec"), globals_dict, globals_dict)"#
        ),
    ]
}

pub(crate) fn prepare_executable(
    ctx: &PrepareContext<'_>,
    args: Vec<String>,
) -> Result<ExecutionManager> {
    let settings = match ctx.spec.execution_settings() {
        ExecutionSettings::Executable(s) => s.clone(),
        _ => ExecutableSettings::default(),
    };
    let (program, argv) = executable_argv(ctx.spec.main_prgm(), ctx.basedir, &settings, args)?;
    Ok(ExecutionManager::Process(ProcessExecutionManager::new(
        program,
        argv,
        ctx.basedir,
    )))
}

/// Program and argv of an executable tool.
pub(crate) fn executable_argv(
    main_prgm: Option<&str>,
    basedir: &Path,
    settings: &ExecutableSettings,
    args: Vec<String>,
) -> Result<(String, Vec<String>)> {
    if let Some(main) = main_prgm {
        let script = posix_string(&basedir.join(main));
        if cfg!(windows) {
            return Ok((script, args));
        }
        let mut argv = vec![script];
        argv.extend(args);
        return Ok(("sh".to_string(), argv));
    }

    let tokens = shlex::split(&settings.cmd).ok_or_else(|| {
        ItemError::PrepareFailed(format!("cannot parse command '{}'", settings.cmd))
    })?;
    if tokens.is_empty() {
        return Err(ItemError::PrepareFailed("command is empty".to_string()));
    }

    match settings.shell.trim() {
        "" => {
            let mut tokens = tokens.into_iter();
            let program = tokens.next().unwrap_or_default();
            let mut argv: Vec<String> = tokens.collect();
            argv.extend(args);
            Ok((program, argv))
        }
        shell @ ("cmd.exe" | "cmd") => {
            let mut argv = Vec::with_capacity(tokens.len() + args.len() + 1);
            if !tokens.iter().any(|t| t.eq_ignore_ascii_case("/C")) {
                argv.push("/C".to_string());
            }
            argv.extend(tokens);
            argv.extend(args);
            Ok((shell.to_string(), argv))
        }
        shell => {
            let shell = if shell == "bash" { "sh" } else { shell };
            // POSIX shells take the whole command line as one `-c` operand.
            let line = tokens
                .iter()
                .chain(args.iter())
                .map(|t| shlex::try_quote(t).map(|q| q.into_owned()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ItemError::PrepareFailed(format!("cannot quote argument: {e}")))?
                .join(" ");
            Ok((shell.to_string(), vec!["-c".to_string(), line]))
        }
    }
}

fn require_kernel<'a>(kernel: &'a str, spec_name: &str) -> Result<&'a str> {
    let kernel = kernel.trim();
    if kernel.is_empty() {
        return Err(ItemError::PrerequisiteMissing(format!(
            "No kernel spec selected for specification '{spec_name}'"
        )));
    }
    Ok(kernel)
}

/// Quote `s` as a Python string literal.
fn python_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Quote `s` as a Julia string literal; `$` must not interpolate.
fn julia_string(s: &str) -> String {
    python_string(s).replace('$', "\\$")
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(cmd: &str, shell: &str) -> ExecutableSettings {
        ExecutableSettings {
            cmd: cmd.to_string(),
            shell: shell.to_string(),
        }
    }

    #[test]
    fn command_without_shell_splits_program_and_args() {
        let (program, argv) =
            executable_argv(None, Path::new("/w"), &cmd("echo hello", ""), vec!["x".into()])
                .unwrap();
        assert_eq!(program, "echo");
        assert_eq!(argv, vec!["hello", "x"]);
    }

    #[test]
    fn cmd_shell_gets_slash_c_once() {
        let (program, argv) =
            executable_argv(None, Path::new("/w"), &cmd("dir", "cmd.exe"), Vec::new()).unwrap();
        assert_eq!(program, "cmd.exe");
        assert_eq!(argv, vec!["/C", "dir"]);

        let (_, argv) =
            executable_argv(None, Path::new("/w"), &cmd("/c dir", "cmd"), Vec::new()).unwrap();
        assert_eq!(argv, vec!["/c", "dir"]);
    }

    #[test]
    fn bash_is_normalised_to_sh() {
        let (program, argv) = executable_argv(
            None,
            Path::new("/w"),
            &cmd("echo 'a b'", "bash"),
            vec!["c".into()],
        )
        .unwrap();
        assert_eq!(program, "sh");
        assert_eq!(argv, vec!["-c", "echo 'a b' c"]);
    }

    #[cfg(unix)]
    #[test]
    fn script_runs_through_sh() {
        let (program, argv) =
            executable_argv(Some("run.sh"), Path::new("/w"), &cmd("", ""), vec!["1".into()])
                .unwrap();
        assert_eq!(program, "sh");
        assert_eq!(argv, vec!["/w/run.sh", "1"]);
    }

    #[test]
    fn julia_command_quotes_and_escapes() {
        let command = julia_run_command(Path::new("/w"), "main.jl", &["a$b".to_string()]);
        assert_eq!(
            command,
            r#"cd("/w"); empty!(ARGS); append!(ARGS, String["a\$b"]); include("/w/main.jl")"#
        );
    }

    #[test]
    fn python_repl_commands_end_with_three_line_init() {
        let commands = python_repl_commands(Path::new("/w"), "main.py", &["1".to_string()]);
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[0], r#"import sys; sys.argv = ["/w/main.py", "1"]"#);
        assert_eq!(commands[1], r#"import os; os.chdir("/w")"#);
        assert_eq!(commands[2], "globals_dict = globals()");
        assert!(commands[3].contains(r#""__file__": "/w/main.py""#));
        assert!(commands[4].starts_with(r#"with open("/w/main.py", "rb") as f:"#));
    }

    #[test]
    fn python_kernel_commands_cd_then_run() {
        let commands =
            python_kernel_commands(Path::new("/w"), "main.py", &["a".into(), "b".into()]);
        assert_eq!(commands, vec![r#"%cd -q "/w""#, r#"%run "main.py" "a" "b""#]);
    }
}
