use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Once};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "irx::interp::deopt=debug,irx::interp::slowpath=debug,irx::passes=info,irx::persist=debug";

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use irx_core::{
    interp::{CacheStats, ExecutionContext, InterpConfig},
    ir::{
        Scope,
        passes::{PassConfig, PassManager},
        printer,
    },
    persist::{self, IrModule, ModuleFlags},
    runtime::Runtime,
    samples,
};
use serde::Serialize;
use tracing::info;

#[cfg(test)]
mod main_test;

#[derive(Debug, Parser)]
#[command(name = "irx", author, version, about = "CLI for the IRX interpreter", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, treat as an IRXB file to run
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the built-in sample programs.
    List,
    /// Write a built-in sample program as an IRXB file.
    Sample {
        name: String,
        /// Output path (defaults to NAME.irxb)
        #[arg(short, long, value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        /// Run the pass pipeline before writing
        #[arg(long)]
        opt: bool,
    },
    /// Print the IR listing of an IRXB file.
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        /// Run the pass pipeline before printing
        #[arg(long)]
        opt: bool,
    },
    /// Print the computed flags of every scope in an IRXB file.
    Flags {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Execute an IRXB file.
    Run {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        /// Run the pass pipeline first
        #[arg(long)]
        opt: bool,
        /// Also enable the method inliner (implies --opt)
        #[arg(long)]
        inline: bool,
        /// Dump the listing to stderr after the named pass
        #[arg(long, value_name = "PASS")]
        dump_after: Option<String>,
        /// Print call-site cache counters to stderr as JSON
        #[arg(long)]
        stats: bool,
        /// Disable per-site method caches
        #[arg(long)]
        no_ic: bool,
    },
}

fn sanitize_path(raw: &str) -> Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            bail!("Parent directory components ('..') are not allowed in file paths.");
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `IRX_TRACE=1` enables the default filter; any other non-false value is
/// taken as an `EnvFilter` expression.
fn maybe_init_tracing() {
    let raw = match std::env::var("IRX_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn load_module(path: &Path) -> Result<IrModule> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read file '{}'", path.display()))?;
    persist::decode_module(&bytes).with_context(|| format!("Failed to decode IRXB module '{}'", path.display()))
}

fn optimize(module: &mut IrModule, config: &PassConfig, dump_after: Option<&str>) -> Result<()> {
    let mut pm = PassManager::with_config(config);
    if let Some(pass) = dump_after {
        if !pm.pass_names().contains(&pass) {
            bail!("unknown pass '{}' (pipeline: {})", pass, pm.pass_names().join(", "));
        }
        pm.set_dump_after(pass);
    }
    pm.run(Arc::make_mut(&mut module.root))?;
    module.flags.insert(ModuleFlags::OPTIMIZED);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScopeReport {
    kind: String,
    name: String,
    line: u32,
    flags: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nested: Vec<ScopeReport>,
}

impl ScopeReport {
    fn new(scope: &Scope) -> Self {
        Self {
            kind: scope.kind().to_string(),
            name: scope.name().to_string(),
            line: scope.line(),
            flags: scope.flags().names(),
            nested: scope.nested_scopes().into_iter().map(|s| ScopeReport::new(s)).collect(),
        }
    }

    fn write_text(&self, out: &mut String, depth: usize) {
        let flags = if self.flags.is_empty() {
            "-".to_string()
        } else {
            self.flags.join(" | ")
        };
        out.push_str(&format!("{}{} {}: {}\n", "  ".repeat(depth), self.kind, self.name, flags));
        for child in &self.nested {
            child.write_text(out, depth + 1);
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsReport {
    hits: u64,
    misses: u64,
    invalidations: u64,
    bypassed: u64,
    deopts: u64,
}

impl From<CacheStats> for StatsReport {
    fn from(s: CacheStats) -> Self {
        Self {
            hits: s.hits,
            misses: s.misses,
            invalidations: s.invalidations,
            bypassed: s.bypassed,
            deopts: s.deopts,
        }
    }
}

fn write_sample(name: &str, output: Option<PathBuf>, opt: bool) -> Result<()> {
    let Some(sample) = samples::find(name) else {
        bail!("unknown sample '{}' (available: {})", name, samples::names().join(", "));
    };
    let mut module = IrModule::new(sample.build()).with_source(format!("sample:{}", sample.name));
    if let Some(meta) = module.meta.as_mut() {
        meta.tags.insert("summary".to_string(), sample.summary.to_string());
    }
    if opt {
        optimize(&mut module, &PassConfig::default(), None)?;
    }

    let out_path = output.unwrap_or_else(|| PathBuf::from(format!("{}.irxb", sample.name)));
    let bytes = persist::encode_module(&module)?;
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory for {}", out_path.display()))?;
    }
    std::fs::write(&out_path, &bytes).with_context(|| format!("Failed to write IR to {}", out_path.display()))?;
    eprintln!("Wrote {} to {} ({} bytes)", sample.name, out_path.display(), bytes.len());
    Ok(())
}

#[derive(Default)]
struct RunOptions {
    opt: bool,
    inline: bool,
    dump_after: Option<String>,
    stats: bool,
    no_ic: bool,
}

fn run_file(path: &Path, opts: RunOptions) -> Result<()> {
    let mut module = load_module(path)?;
    if opts.opt || opts.inline || opts.dump_after.is_some() {
        let config = PassConfig {
            inline: opts.inline,
            ..PassConfig::default()
        };
        optimize(&mut module, &config, opts.dump_after.as_deref())?;
    }

    let mut config = InterpConfig::from_env();
    if opts.no_ic {
        config = config.without_caches();
    }
    let rt = Runtime::new();
    let mut ctx = ExecutionContext::with_config(rt.clone(), config);
    info!(target: "irx::cli", file = %path.display(), "running module");
    let result = ctx.run_script(&module.root);
    print!("{}", rt.take_output());

    if opts.stats {
        eprintln!("{}", serde_json::to_string(&StatsReport::from(ctx.stats()))?);
    }
    match result {
        Ok(value) => {
            println!("=> {}", value.inspect());
            Ok(())
        }
        Err(unwind) => bail!("{}", unwind),
    }
}

fn main() -> Result<()> {
    maybe_init_tracing();

    let CliArgs { command, file } = CliArgs::parse();

    let Some(cmd) = command else {
        return match file {
            Some(path) => run_file(&path, RunOptions::default()),
            None => {
                CliArgs::command().print_help()?;
                Ok(())
            }
        };
    };

    match cmd {
        Commands::List => {
            for sample in samples::SAMPLES {
                println!("{:<8} {}", sample.name, sample.summary);
            }
            Ok(())
        }
        Commands::Sample { name, output, opt } => write_sample(&name, output, opt),
        Commands::Disasm { file, opt } => {
            let mut module = load_module(&file)?;
            if opt {
                optimize(&mut module, &PassConfig::default(), None)?;
            }
            if let Some(source) = module.meta.as_ref().and_then(|m| m.source.as_deref()) {
                println!("# source: {}", source);
            }
            print!("{}", printer::listing(&module.root));
            Ok(())
        }
        Commands::Flags { file, json } => {
            let module = load_module(&file)?;
            let report = ScopeReport::new(&module.root);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let mut out = String::new();
                report.write_text(&mut out, 0);
                print!("{}", out);
            }
            Ok(())
        }
        Commands::Run {
            file,
            opt,
            inline,
            dump_after,
            stats,
            no_ic,
        } => run_file(
            &file,
            RunOptions {
                opt,
                inline,
                dump_after,
                stats,
                no_ic,
            },
        ),
    }
}
