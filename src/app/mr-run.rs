use anyhow::*;
use bytes::Bytes;
use clap::Parser;
use mrengine::sink::{JsonSink, OutputSink, TextSink};
use mrengine::source::collect_inputs;
use mrengine::standalone::{Args, Format, Job};
use mrengine::workload::Application;
use mrengine::*;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .init();
}

fn write_results(
    results: &ResultMapping<Bytes, Bytes>,
    format: Format,
    writer: impl Write,
) -> Result<()> {
    match format {
        Format::Text => TextSink::new(writer).write(results),
        Format::Json => JsonSink::new(writer).pretty().write(results),
    }
}

fn run_standalone_mr_job(job: Job) -> Result<()> {
    let workload = workload::named(&job.workload)?;
    let app = Application::new(workload, &job.args)?;
    let inputs = collect_inputs(&job.input)?;
    info!(inputs = inputs.len(), workload = %job.workload, "starting job");

    /*  Map, shuffle and reduce all happen in this process; the engine only
     *  hands back the reduced values and we decide where they go.
     */
    let engine = Engine::new(job.config.clone());
    let Completed { results, stats } =
        engine.execute::<_, Bytes, Bytes, Bytes, _, _>(&inputs, &app, &app)?;
    info!(
        keys = stats.keys,
        pairs = stats.pairs_emitted,
        skipped = stats.unavailable_inputs,
        "job finished"
    );

    match &job.output {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {dir}"))?;
            let name = match job.format {
                Format::Text => "mr-out",
                Format::Json => "mr-out.json",
            };
            let out_pathspec = Path::new(dir).join(name);
            let out_file = File::create(&out_pathspec)
                .with_context(|| format!("failed to create {}", out_pathspec.display()))?;
            write_results(&results, job.format, BufWriter::new(out_file))
        }
        None => write_results(&results, job.format, io::stdout().lock()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let job = Job::from_command(args.command);

    run_standalone_mr_job(job)
}
