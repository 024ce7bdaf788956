//! formvault CLI
//!
//! ```text
//! formvault [--config FILE] <form.xml> [name=path[:content-type] ...]
//! formvault [--config FILE] --list
//! ```
//!
//! Submits one payload to the configured store and prints the resulting
//! document as JSON on stdout. Logs go to stderr.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use formvault::{
    Attachment, DocKind, FormMetadata, FormStore, FormvaultConfig, InstanceDocument, Submission,
    SubmissionGateway, SubmissionOutcome, TracingObserver,
};
use serde::Serialize;

const USAGE: &str =
    "usage: formvault [--config FILE] <form.xml> [name=path[:content-type] ...]\n       formvault [--config FILE] --list";

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    list: bool,
    form: Option<String>,
    attachments: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(iter.next().context("--config needs a file")?);
            }
            "--list" => args.list = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ if args.form.is_none() && !args.list => args.form = Some(arg),
            _ => args.attachments.push(arg),
        }
    }
    Ok(args)
}

/// `name=path[:content-type]`
fn parse_attachment(item: &str) -> anyhow::Result<(String, Attachment)> {
    let (name, rest) = item
        .split_once('=')
        .with_context(|| format!("attachment `{item}` must look like name=path[:content-type]"))?;
    let (path, content_type) = match rest.rsplit_once(':') {
        Some((path, mime)) if mime.contains('/') => (path, mime),
        _ => (rest, "application/octet-stream"),
    };
    let data = fs::read(path).with_context(|| format!("reading attachment {path}"))?;
    Ok((name.to_string(), Attachment::new(content_type, data)))
}

fn init_tracing(config: &FormvaultConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.as_str())
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Serialize)]
struct AttachmentSummary<'a> {
    content_type: &'a str,
    length: u64,
}

/// JSON view of a stored document; the payload is reported by size and digest.
#[derive(Serialize)]
struct DocumentSummary<'a> {
    id: &'a str,
    kind: DocKind,
    received_at: DateTime<Utc>,
    problem: Option<&'a str>,
    orig_id: Option<&'a str>,
    payload_bytes: usize,
    digest: String,
    metadata: &'a FormMetadata,
    attachments: BTreeMap<&'a str, AttachmentSummary<'a>>,
}

impl<'a> From<&'a InstanceDocument> for DocumentSummary<'a> {
    fn from(doc: &'a InstanceDocument) -> Self {
        Self {
            id: &doc.id,
            kind: doc.kind,
            received_at: doc.received_at,
            problem: doc.problem.as_deref(),
            orig_id: doc.orig_id.as_deref(),
            payload_bytes: doc.payload.len(),
            digest: doc.content_digest(),
            metadata: &doc.metadata,
            attachments: doc
                .attachments
                .iter()
                .map(|(name, a)| {
                    (
                        name.as_str(),
                        AttachmentSummary {
                            content_type: &a.content_type,
                            length: a.length,
                        },
                    )
                })
                .collect(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => FormvaultConfig::from_file(path)
            .with_context(|| format!("loading config {path}"))?,
        None => FormvaultConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    init_tracing(&config);

    let gateway_config = config.gateway_config()?;
    let store = Arc::new(FormStore::open(&gateway_config.store)?);

    if args.list {
        for doc in store.list()? {
            println!("{}\t{}", doc.id, doc.kind);
        }
        return Ok(());
    }

    let Some(form) = args.form.as_deref() else {
        bail!("{USAGE}");
    };
    let payload = fs::read(form).with_context(|| format!("reading form {form}"))?;
    let mut submission = Submission::new(payload);
    for item in &args.attachments {
        let (name, attachment) = parse_attachment(item)?;
        submission = submission.with_attachment(name, attachment)?;
    }

    let gateway = SubmissionGateway::with_store(Arc::clone(&store), &gateway_config)?
        .with_observer(Arc::new(TracingObserver));
    let outcome = gateway.submit(&submission);
    store.flush()?;

    println!(
        "{}",
        serde_json::to_string_pretty(&DocumentSummary::from(outcome.document()))?
    );

    match outcome {
        SubmissionOutcome::Stored(_) => Ok(()),
        SubmissionOutcome::StoredWithDownstreamFailure { cause, .. } => {
            Err(cause).context("document stored but post-save processing failed")
        }
        SubmissionOutcome::Failed(err) => Err(err.into()),
    }
}
