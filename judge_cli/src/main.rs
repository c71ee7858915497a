use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use judge_core::{
    compile::{CompileResult, CompilerEnvironmentStatus},
    config::JudgeConfig,
    judge::{JudgeSettings, Pipeline},
    sandbox::docker::DockerProvider,
    submission::{Language, Submission, TestCase},
};

#[derive(Parser)]
#[clap(
    version = "0.1.0",
    name = "Judge",
    author = "kanari",
    about = "Compile and judge untrusted code inside disposable containers."
)]
struct Opts {
    #[clap(short, long, default_value = "judge.yaml", help = "config file")]
    config: String,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    #[clap(about = "Check which toolchains are installed")]
    Check,
    #[clap(about = "Compile a source file")]
    Compile(CompileConfig),
    #[clap(about = "Judge a source file against one case")]
    Run(RunConfig),
    #[clap(about = "Judge a whole submission record")]
    Prefab(PrefabConfig),
}

#[derive(Args, Debug)]
struct CompileConfig {
    #[clap(help = "path of source")]
    file: String,
}

#[derive(Args, Debug)]
struct RunConfig {
    #[clap(help = "path of source")]
    src_path: String,
    #[clap(short, help = "input file path")]
    input_file: String,
    #[clap(short, help = "answer file path")]
    answer_file: String,
    #[clap(short, help = "memory limit(MB)")]
    memory_limit: Option<u64>,
    #[clap(short, help = "time limit(s)")]
    time_limit: Option<u64>,
}

#[derive(Args, Debug)]
struct PrefabConfig {
    #[clap(help = "submission json")]
    submission: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts: Opts = Opts::parse();
    let mut config = JudgeConfig::load_or_default(&opts.config)?;

    match opts.subcmd {
        SubCommand::Check => {
            for language in Language::all().iter() {
                match language.check_environment() {
                    CompilerEnvironmentStatus::OK { version, path } => {
                        println!("{:<8} {} ({})", language, version, path)
                    }
                    CompilerEnvironmentStatus::Missing => println!("{:<8} missing", language),
                }
            }
        }
        SubCommand::Compile(args) => {
            let (language, src) = read_source(&args.file)?;
            let compiler = language.compiler(&config.work_dir, &config.toolchain)?;
            match compiler.compile(&src)? {
                CompileResult::OK(program) => println!("compiled: {}", program.command_line()),
                CompileResult::CompileError(msg) => {
                    println!("{}", msg);
                    return Err(anyhow!("failed to compile `{}`", args.file));
                }
            }
        }
        SubCommand::Run(args) => {
            if let Some(time_limit) = args.time_limit {
                config.limit.time_limit = time_limit;
            }
            let (language, src) = read_source(&args.src_path)?;
            let case = TestCase {
                key: "0".into(),
                input: fs::read_to_string(&args.input_file)
                    .with_context(|| format!("reading `{}`", args.input_file))?,
                expected_output: fs::read_to_string(&args.answer_file)
                    .with_context(|| format!("reading `{}`", args.answer_file))?,
            };
            let submission = Submission::new(
                "cli",
                language,
                src,
                Some(args.memory_limit.unwrap_or(config.limit.memory_limit)),
                vec![case],
            )?;
            let results = pipeline(&config)?.judge(&submission);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        SubCommand::Prefab(args) => {
            let id = Path::new(&args.submission)
                .file_stem()
                .and_then(|f| f.to_str())
                .unwrap_or("prefab")
                .to_string();
            let payload = fs::read(&args.submission)
                .with_context(|| format!("reading `{}`", args.submission))?;
            let submission = Submission::from_json(&id, &payload, config.limit.memory_limit)?;
            let results = pipeline(&config)?.judge(&submission);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

fn pipeline(config: &JudgeConfig) -> Result<Pipeline> {
    Ok(Pipeline::new(
        Box::new(DockerProvider::new(config.docker.clone())),
        JudgeSettings::from(config),
    )?)
}

fn read_source(file: &str) -> Result<(Language, String)> {
    let path = Path::new(file);
    let language = Language::from_path(path)
        .ok_or_else(|| anyhow!("unsupported source suffix of `{}`", file))?;
    let src = fs::read_to_string(path).with_context(|| format!("reading `{}`", file))?;
    Ok((language, src))
}
