//! Native Bridge CLI Application
//!
//! Command-line companion for the native-bridge library:
//! - Encode a call into a bridge address
//! - Decode an intercepted address back into a call
//! - Replay a scripted sequence of calls against a simulated console host

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use native_bridge::{
    channel, AddressCodec, CallRequest, CallbackId, HostDispatcher, InterceptTransport, Params,
    Transport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

mod config;
mod host;
mod report;
mod script;

use config::{AppConfig, OutputFormat};
use report::{EventRecord, ReplayReport, ReplyRecord};

/// Native Bridge - Encode, decode and replay bridge calls
#[derive(Parser, Debug)]
#[command(name = "native-bridge-cli")]
#[command(about = "Encode, decode and replay native bridge calls", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a call into a bridge address
    Encode {
        /// Capability group, e.g. SpeechSynthesizer
        #[arg(long)]
        component: String,

        /// Operation within the group, e.g. speak
        #[arg(long)]
        operation: String,

        /// Parameter as key=value (can be repeated, order is kept)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Correlation id of the caller's callback
        #[arg(long, value_name = "ID")]
        callback: Option<u64>,

        /// Emission token (default: a fresh one)
        #[arg(long)]
        token: Option<String>,
    },

    /// Decode a bridge address and print the call as JSON
    Decode {
        /// Intercepted address, e.g. native://System/log?text=hi
        address: String,
    },

    /// Replay a TOML script of calls against a console host
    Replay {
        /// Path to the replay script
        script: PathBuf,

        /// Time to keep listening for late host events after the last reply
        #[arg(long, value_name = "MS", default_value_t = 500)]
        wait_ms: u64,

        /// Report format (overrides [output] in the config)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Native Bridge CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using bridge library v{}", native_bridge::VERSION);

    let app = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match args.command {
        Command::Encode {
            component,
            operation,
            params,
            callback,
            token,
        } => {
            let request = CallRequest::new(component, operation, params.into_iter().collect());
            encode_mode(&app, &request, callback.map(CallbackId), token)
        }
        Command::Decode { address } => decode_mode(&app, &address),
        Command::Replay {
            script,
            wait_ms,
            format,
        } => {
            let format = format.unwrap_or(app.output.format);
            replay_mode(&app, &script, Duration::from_millis(wait_ms), format).await
        }
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

fn encode_mode(
    app: &AppConfig,
    request: &CallRequest,
    callback: Option<CallbackId>,
    token: Option<String>,
) -> Result<()> {
    let codec = AddressCodec::new(&app.bridge);
    let token = token.unwrap_or_else(|| native_bridge::codec::emission_token(0));

    let address = codec
        .encode(request, callback, &token)
        .context("Failed to encode call")?;
    println!("{address}");
    Ok(())
}

#[derive(Serialize)]
struct DecodedView {
    component: String,
    operation: String,
    params: Params,
    callback: Option<CallbackId>,
    token: Option<String>,
}

fn decode_mode(app: &AppConfig, address: &str) -> Result<()> {
    let codec = AddressCodec::new(&app.bridge);
    let decoded = codec.decode(address).context("Failed to decode address")?;

    let view = DecodedView {
        component: decoded.request.component,
        operation: decoded.request.operation,
        params: decoded.request.params,
        callback: decoded.callback,
        token: decoded.token,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Replay a script: content-side queue, in-process dispatcher, console host
async fn replay_mode(
    app: &AppConfig,
    path: &Path,
    wait: Duration,
    format: OutputFormat,
) -> Result<()> {
    let script = script::load_script(path)?;
    log::info!(
        "Replaying {} call(s) from {:?} ({} listener(s))",
        script.calls.len(),
        path,
        script.listen.len()
    );

    let (queue, content, dispatch) = channel(&app.bridge);
    let mut dispatcher = HostDispatcher::new(&app.bridge, Arc::new(content));
    host::console_capabilities(&app.host).install(&mut dispatcher);
    log::debug!("Host capabilities: {:?}", dispatcher.capabilities());

    // Record every address on its way to the dispatcher
    let addresses = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&addresses);
    let mut intercept = InterceptTransport::new(Arc::new(dispatcher));
    let dispatch_task = dispatch.spawn(move |address: &str| {
        if let Ok(mut list) = recorded.lock() {
            list.push(address.to_string());
        }
        intercept.navigate(address);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    for name in &script.listen {
        let tx = event_tx.clone();
        let event_name = name.clone();
        queue.on_event(name.as_str(), move |payload| {
            let _ = tx.send(EventRecord {
                name: event_name.clone(),
                payload,
            });
        })?;
    }

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let mut expected = 0;
    for (index, call) in script.calls.iter().enumerate() {
        let params = call.params();
        let enqueued = if call.reply {
            let tx = reply_tx.clone();
            let target = format!("{}/{}", call.component, call.operation);
            queue.enqueue_call_with_callback(
                call.component.as_str(),
                call.operation.as_str(),
                params,
                move |result| {
                    let _ = tx.send(ReplyRecord::new(index, target, result));
                },
            )
        } else {
            queue.enqueue_call(call.component.as_str(), call.operation.as_str(), params)
        };

        match enqueued {
            Ok(()) if call.reply => expected += 1,
            Ok(()) => {}
            Err(e) => log::error!(
                "Call #{index} {}/{} rejected: {e}",
                call.component,
                call.operation
            ),
        }
    }

    queue.flush().await.context("Bridge closed during replay")?;
    log::debug!("All calls dispatched, waiting for {expected} reply(ies)");

    let mut report = ReplayReport::default();
    while report.replies.len() < expected {
        match reply_rx.recv().await {
            Some(reply) => report.replies.push(reply),
            None => break,
        }
    }

    tokio::time::sleep(wait).await;
    while let Ok(event) = event_rx.try_recv() {
        report.events.push(event);
    }

    drop(queue);
    if let Err(e) = dispatch_task.await {
        log::warn!("Dispatch loop ended abnormally: {e}");
    }

    report.addresses = addresses
        .lock()
        .map(|list| list.clone())
        .unwrap_or_default();
    report.replies.sort_by_key(|r| r.call);

    println!("{}", report.render(format)?);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("text=a=b").unwrap(),
            ("text".to_string(), "a=b".to_string())
        );
        assert!(parse_param("flush").is_err());
    }

    #[test]
    fn test_args_parse_encode() {
        let args = Args::try_parse_from([
            "native-bridge-cli",
            "-v",
            "encode",
            "--component",
            "SpeechSynthesizer",
            "--operation",
            "speak",
            "-p",
            "text=hello",
            "-p",
            "flush=true",
        ])
        .unwrap();

        assert_eq!(args.verbose, 1);
        match args.command {
            Command::Encode {
                params,
                callback,
                token,
                ..
            } => {
                assert_eq!(params.len(), 2);
                assert_eq!(params[1].0, "flush");
                assert!(callback.is_none());
                assert!(token.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_reserved_param() {
        let app = AppConfig::default();
        let request = CallRequest::new(
            "SpeechSynthesizer",
            "isSpeaking",
            [("callback", "1")].into_iter().collect(),
        );

        assert!(encode_mode(&app, &request, None, Some("1-1".to_string())).is_err());
    }

    #[tokio::test]
    async fn test_replay_script_end_to_end() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            listen = ["onSpeaking"]

            [[call]]
            component = "SpeechSynthesizer"
            operation = "isSpeaking"
            params = {{ callbackname = "onSpeaking" }}

            [[call]]
            component = "System"
            operation = "log"
            params = {{ text = "replay" }}
            reply = true
            "#
        )
        .unwrap();

        let app = AppConfig::default();
        let result = replay_mode(
            &app,
            file.path(),
            Duration::from_millis(10),
            OutputFormat::Json,
        )
        .await;
        assert!(result.is_ok());
    }
}
