use anyhow::{Context, Result};
use clap::Parser;
use rclflow::catalog::{CallbackKey, SubscriptionCallback};
use rclflow::cli::{Cli, Command, OutputFormat};
use rclflow::config::AnalysisConfig;
use rclflow::filter::{Filter, QueryFilter};
use rclflow::records::{bind_drop_as_delay, Record};
use rclflow::report;
use rclflow::session::TraceSession;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn parse_filter(expr: Option<&str>) -> Result<QueryFilter> {
    match expr {
        Some(expr) => QueryFilter::from_expr(expr).context("Invalid -e expression"),
        None => Ok(QueryFilter::all()),
    }
}

fn parse_callback(node: &str, name: &str) -> Result<CallbackKey> {
    CallbackKey::parse(node, name).with_context(|| {
        format!(
            "Invalid callback name '{}' (expected subscription_callback_N or timer_callback_N)",
            name
        )
    })
}

/// First subscription of `node` on `topic`, if any
fn find_subscription<'a>(session: &'a TraceSession, node: &str, topic: &str) -> Option<&'a SubscriptionCallback> {
    session
        .get_subscription_callbacks(Filter::Only(node), Filter::Only(topic))
        .into_iter()
        .next()
}

fn into_records<R: Into<Record>>(records: Vec<R>) -> Vec<Record> {
    records.into_iter().map(Into::into).collect()
}

fn run<W: Write>(session: &TraceSession, command: &Command, format: OutputFormat, out: &mut W) -> Result<()> {
    match command {
        Command::Nodes => {
            let names: Vec<String> = session.get_node_names().into_iter().collect();
            report::write_entities(out, format, &names)?;
        }
        Command::Publishers { filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let publishers = session.get_publishers(filter.node(), filter.topic());
            report::write_entities(out, format, &publishers)?;
        }
        Command::Subscriptions { filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let subscriptions = session.get_subscription_callbacks(filter.node(), filter.topic());
            report::write_entities(out, format, &subscriptions)?;
        }
        Command::Timers { filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let timers = session.get_timer_callbacks(filter.node(), filter.period());
            report::write_entities(out, format, &timers)?;
        }
        Command::Callback { node, callback } => {
            let key = parse_callback(node, callback)?;
            let records = session.compose_callback_records(&key);
            report::write_records(out, format, &into_records(records))?;
        }
        Command::Inter {
            node,
            topic,
            publisher_node,
            remove_dropped,
            drop_as_delay,
        } => {
            let Some(subscription) = find_subscription(session, node, topic) else {
                return report::write_records(out, format, &[]).map_err(Into::into);
            };
            let publisher = match publisher_node.as_deref() {
                Some(pub_node) => match session
                    .get_publishers(Filter::Only(pub_node), Filter::Only(topic))
                    .first()
                {
                    Some(&publisher) => Some(publisher),
                    // Named node does not publish to the topic
                    None => return report::write_records(out, format, &[]).map_err(Into::into),
                },
                None => None,
            };
            let mut records =
                session.compose_inter_process_communication_records(subscription, publisher, *remove_dropped);
            if *drop_as_delay {
                bind_drop_as_delay(&mut records);
            }
            report::write_records(out, format, &into_records(records))?;
        }
        Command::Intra { node, topic } => {
            let records = find_subscription(session, node, topic)
                .map(|subscription| session.compose_intra_process_communication_records(subscription))
                .unwrap_or_default();
            report::write_records(out, format, &into_records(records))?;
        }
        Command::Variable {
            node,
            write,
            read,
            remove_dropped,
        } => {
            let write = parse_callback(node, write)?;
            let read = parse_callback(node, read)?;
            let records = session.compose_variable_passing_records(&write, &read, *remove_dropped);
            report::write_records(out, format, &into_records(records))?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let session = TraceSession::open(&args.trace, config)
        .with_context(|| format!("Failed to load trace {}", args.trace.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&session, &args.command, args.format, &mut out)?;
    out.flush()?;

    Ok(())
}
