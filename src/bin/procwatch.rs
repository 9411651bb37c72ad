use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use log::{debug, LevelFilter};
use procwatch::compat::sysinfo_backend::SysinfoLibrary;
use procwatch::compat::{Connection, ConnectionKind, ProcessApi, ProcessLibrary};
use procwatch::detection::{watch_directory, watch_process, Detector};
use procwatch::{DetectionConfig, Error, Plugins, Process, Result};
use serde_json::{json, Value};
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Process and socket detection for monitoring-agent setup
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Output in JSON format
    #[clap(short, long)]
    json: bool,

    /// Enable debug logging
    #[clap(short, long)]
    verbose: bool,

    /// Introspection backend
    #[clap(short, long, value_enum, default_value_t = Backend::default())]
    backend: Backend,

    /// Detection config file (JSON)
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Linux /proc, modern API shape
    Procfs,
    /// sysinfo crate, legacy API shape
    Sysinfo,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Backend::Procfs
        } else {
            Backend::Sysinfo
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the first process whose command line contains a string
    Cmdline {
        #[clap(required = true)]
        search: String,
    },

    /// Find the first process with an exact name
    Name {
        #[clap(required = true)]
        name: String,
    },

    /// Check a service through `service <name> status`
    Service {
        #[clap(required = true)]
        name: String,
    },

    /// List addresses listening on a port
    Listening {
        port: u16,

        /// Connection kind (inet, inet4, inet6, tcp, tcp4, tcp6, udp, udp4, udp6)
        #[clap(short, long)]
        kind: Option<ConnectionKind>,

        /// Only the first TCP listener, IPv4-mapped addresses unwrapped
        #[clap(long)]
        tcp: bool,
    },

    /// List system-wide socket connections
    Connections {
        #[clap(short, long, default_value = "inet")]
        kind: ConnectionKind,
    },

    /// Show the metrics of one process
    Inspect {
        pid: u32,

        /// CPU sampling interval in milliseconds
        #[clap(short, long, default_value = "100")]
        interval: u64,
    },

    /// Print a process plugin config
    WatchProcess {
        #[clap(required = true)]
        search: Vec<String>,

        /// Instance name (default: first search string)
        #[clap(long)]
        name: Option<String>,

        #[clap(long)]
        service: Option<String>,

        #[clap(long)]
        component: Option<String>,

        /// Match search strings as substrings
        #[clap(long)]
        loose: bool,
    },

    /// Print a directory plugin config
    WatchDir {
        directory: String,

        #[clap(long)]
        service: Option<String>,

        #[clap(long)]
        component: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

/// Run the selected command; `Ok(false)` means "nothing found"
fn run(args: &Args) -> Result<bool> {
    let config = match &args.config {
        Some(path) => DetectionConfig::from_file(path)?,
        None => DetectionConfig::default(),
    };
    debug!("using {:?} backend", args.backend);

    match args.backend {
        #[cfg(target_os = "linux")]
        Backend::Procfs => {
            let library = procwatch::compat::procfs_backend::ProcfsLibrary::new();
            execute(&Detector::with_config(library, config), args)
        }
        #[cfg(not(target_os = "linux"))]
        Backend::Procfs => Err(Error::not_supported("the procfs backend on this platform")),
        Backend::Sysinfo => execute(&Detector::with_config(SysinfoLibrary::new(), config), args),
    }
}

fn execute<L: ProcessLibrary>(detector: &Detector<L>, args: &Args) -> Result<bool> {
    match &args.command {
        Commands::Cmdline { search } => {
            let found = detector.find_process_cmdline(search)?;
            report_process(found.as_ref(), args.json)
        }
        Commands::Name { name } => {
            let found = detector.find_process_name(name)?;
            report_process(found.as_ref(), args.json)
        }
        Commands::Service { name } => {
            let running = detector.find_process_service(name);
            if args.json {
                println!("{}", json!({ "service": name, "running": running }));
            } else if running {
                println!("{} {}", name.cyan(), "running".green());
            } else {
                println!("{} {}", name.cyan(), "not running".red());
            }
            Ok(running)
        }
        Commands::Listening { port, kind, tcp } => {
            let addrs = if *tcp {
                detector
                    .find_addr_listening_on_port_over_tcp(*port)?
                    .into_iter()
                    .collect()
            } else {
                detector.find_addrs_listening_on_port(*port, *kind)?
            };
            if args.json {
                println!("{}", serde_json::to_string(&addrs)?);
            } else if addrs.is_empty() {
                println!("Nothing listening on port {}", port.to_string().cyan());
            } else {
                for addr in &addrs {
                    println!("{} {}", "LISTEN".green(), format!("{}:{}", addr, port).cyan());
                }
            }
            Ok(!addrs.is_empty())
        }
        Commands::Connections { kind } => {
            let conns = detector.compat().net_connections(*kind)?;
            if args.json {
                println!("{}", serde_json::to_string(&conns)?);
            } else {
                for conn in &conns {
                    println!("{}", format_connection(conn));
                }
                println!("{} connections", conns.len());
            }
            Ok(true)
        }
        Commands::Inspect { pid, interval } => {
            let process = detector.compat().process(*pid)?;
            let report = inspect(&process, Duration::from_millis(*interval));
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Process {} ({} api)",
                    pid.to_string().cyan(),
                    process.shape()
                );
                if let Value::Object(fields) = &report {
                    for (key, value) in fields {
                        println!("  {:<16} {}", key.bright_black(), value);
                    }
                }
            }
            Ok(true)
        }
        Commands::WatchProcess {
            search,
            name,
            service,
            component,
            loose,
        } => {
            let mut builder = watch_process(search.iter().cloned()).exact_match(!loose);
            if let Some(name) = name {
                builder = builder.process_name(name);
            }
            if let Some(service) = service {
                builder = builder.service(service);
            }
            if let Some(component) = component {
                builder = builder.component(component);
            }
            print_plugins(&builder.build()?)
        }
        Commands::WatchDir {
            directory,
            service,
            component,
        } => {
            let mut builder = watch_directory(directory);
            if let Some(service) = service {
                builder = builder.service(service);
            }
            if let Some(component) = component {
                builder = builder.component(component);
            }
            print_plugins(&builder.build()?)
        }
    }
}

fn report_process<H: ProcessApi>(found: Option<&Process<H>>, as_json: bool) -> Result<bool> {
    match found {
        Some(process) => {
            let name = process.name().unwrap_or_default();
            if as_json {
                println!("{}", json!({ "pid": process.pid(), "name": name }));
            } else {
                println!("{} {}", process.pid().to_string().cyan(), name.green());
            }
            Ok(true)
        }
        None => {
            if as_json {
                println!("null");
            } else {
                println!("{}", "No matching process".yellow());
            }
            Ok(false)
        }
    }
}

fn print_plugins(plugins: &Plugins) -> Result<bool> {
    println!("{}", plugins.to_json_pretty()?);
    Ok(true)
}

/// One field of an inspect report; unsupported accessors show as null
fn field<T: serde::Serialize>(value: Result<T>) -> Value {
    match value {
        Ok(v) => serde_json::to_value(v).unwrap_or(Value::Null),
        Err(Error::NotSupported(what)) => {
            debug!("not supported: {}", what);
            Value::Null
        }
        Err(e) => Value::String(e.to_string()),
    }
}

fn inspect<H: ProcessApi>(process: &Process<H>, interval: Duration) -> Value {
    json!({
        "name": field(process.name()),
        "exe": field(process.exe()),
        "cmdline": field(process.cmdline().map(|c| c.join(" "))),
        "cwd": field(process.cwd()),
        "cpu_percent": field(process.cpu_percent(Some(interval))),
        "cpu_times": field(process.cpu_times()),
        "memory_info": field(process.memory_info()),
        "memory_percent": field(process.memory_percent()),
        "io_counters": field(process.io_counters()),
        "nice": field(process.nice(None)),
        "ionice": field(process.ionice(None)),
        "num_threads": field(process.num_threads()),
        "num_fds": field(process.num_fds()),
        "ctx_switches": field(process.num_ctx_switches()),
        "connections": field(process.connections(ConnectionKind::Inet).map(|c| c.len())),
    })
}

fn format_connection(conn: &Connection) -> String {
    fn addr_or_dash<T: Display>(addr: Option<T>) -> String {
        addr.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
    }

    format!(
        "{:<6} {:<28} {:<28} {:<12} {}",
        format!("{:?}", conn.socket_type).to_lowercase(),
        addr_or_dash(conn.laddr),
        addr_or_dash(conn.raddr),
        conn.status.to_string().yellow(),
        addr_or_dash(conn.pid).cyan(),
    )
}
