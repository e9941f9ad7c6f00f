//! Tabwright CLI - clean, combine and export tabular files
//!
//! # Main Commands
//!
//! ```bash
//! tabwright serve                          # Start HTTP server (port 3000)
//! tabwright run a.csv b.xlsx --script s.json --output out.xlsx
//! tabwright inspect a.csv                  # Parse and preview one file
//! ```
//!
//! # Reference Commands
//!
//! ```bash
//! tabwright transforms                     # Show available transforms
//! tabwright example-script                 # Show an example script
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tabwright::{
    export, CombineMode, ExportFormat, Script, ServerConfig, Session, Table,
};

#[derive(Parser)]
#[command(name = "tabwright")]
#[command(about = "Clean, combine and export CSV and spreadsheet files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one file and print a preview as JSON
    Inspect {
        /// Input CSV / TSV / XLSX file
        input: PathBuf,

        /// Number of preview rows
        #[arg(short, long, default_value = "20")]
        rows: usize,
    },

    /// Run a cleaning script over one or more files
    Run {
        /// Input files, loaded in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Script JSON file (see `example-script`)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Combine the datasets (overrides the script)
        #[arg(short, long, value_enum)]
        combine: Option<CombineArg>,

        /// Merge key, required with `--combine merge`
        #[arg(short, long)]
        key: Option<String>,

        /// Output file, .xlsx or .csv (default: JSON preview on stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of preview rows when printing
        #[arg(long, default_value = "20")]
        rows: usize,
    },

    /// Show available transforms
    Transforms,

    /// Show example script
    ExampleScript,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: TABWRIGHT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (default: TABWRIGHT_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Directory served at `/`
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CombineArg {
    Concatenate,
    Merge,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { input, rows } => cmd_inspect(&input, rows),

        Commands::Run {
            inputs,
            script,
            combine,
            key,
            output,
            rows,
        } => cmd_run(
            &inputs,
            script.as_deref(),
            combine,
            key,
            output.as_deref(),
            rows,
        ),

        Commands::Transforms => cmd_transforms(),

        Commands::ExampleScript => cmd_example_script(),

        Commands::Serve {
            port,
            host,
            static_dir,
        } => cmd_serve(port, host, static_dir).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_inspect(input: &Path, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::new();
    let id = session.load_file(input)?;
    let table = session.get_table(&id)?;

    eprintln!("   Columns: {}", table.column_names().join(", "));
    let json = serde_json::to_string_pretty(&table.preview(rows))?;
    println!("{}", json);
    Ok(())
}

fn cmd_run(
    inputs: &[PathBuf],
    script_path: Option<&Path>,
    combine: Option<CombineArg>,
    key: Option<String>,
    output: Option<&Path>,
    rows: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut script = match script_path {
        Some(path) => {
            eprintln!("📜 Script: {}", path.display());
            Script::from_json(&fs::read_to_string(path)?)?
        }
        None => Script::default(),
    };
    if let Some(mode) = combine_mode(combine, key)? {
        script.combine = Some(mode);
    }

    let mut session = Session::new();
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        eprintln!("📄 Processing: {}", input.display());
        let id = session.load_file(input)?;
        if !script.steps.is_empty() {
            session.run_steps(&id, &script)?;
        }
        ids.push(id);
    }

    let result: &Table = match &script.combine {
        Some(mode) => session.combine_with(mode, &script.after_combine)?,
        None => match ids.as_slice() {
            [only] => session.get_table(only)?,
            _ => {
                if output.is_some() {
                    return Err("several inputs need --combine (or a script with `combine`) to be written to one file".into());
                }
                for id in &ids {
                    let table = session.get_table(id)?;
                    println!("{}", serde_json::to_string_pretty(&table.preview(rows))?);
                }
                eprintln!("\n✨ Done!");
                return Ok(());
            }
        },
    };

    match output {
        Some(path) => {
            let format = ExportFormat::from_path(path);
            let bytes = export(result, format)?;
            fs::write(path, bytes)?;
            eprintln!(
                "💾 Wrote {} rows, {} columns to: {}",
                result.num_rows(),
                result.num_columns(),
                path.display()
            );
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&result.preview(rows))?);
        }
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn combine_mode(
    combine: Option<CombineArg>,
    key: Option<String>,
) -> Result<Option<CombineMode>, Box<dyn std::error::Error>> {
    match (combine, key) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err("--key only applies with --combine merge".into()),
        (Some(CombineArg::Concatenate), _) => Ok(Some(CombineMode::Concatenate)),
        (Some(CombineArg::Merge), Some(key)) => Ok(Some(CombineMode::Merge { key })),
        (Some(CombineArg::Merge), None) => Err("--combine merge needs --key".into()),
    }
}

fn cmd_transforms() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", tabwright::transforms_description());
    Ok(())
}

fn cmd_example_script() -> Result<(), Box<dyn std::error::Error>> {
    let script = tabwright::example_script();
    println!("{}", script.to_json()?);
    Ok(())
}

async fn cmd_serve(
    port: Option<u16>,
    host: Option<IpAddr>,
    static_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env();
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(dir) = static_dir {
        config = config.with_static_dir(dir);
    }
    tabwright::server::start_server(config).await
}
