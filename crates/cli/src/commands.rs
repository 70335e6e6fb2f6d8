//! Implementations of the subcommands.

use std::future::Future;
use std::io::Write;

use anyhow::{anyhow, bail, Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use audioconv_core::{
    AudioFormat, BatchRequest, BatchSummary, ConversionEvent, ConversionOrchestrator,
    ConversionRequest, JobOutcome, OrchestratorError,
};

use crate::cli::{BatchArgs, CodecsArgs, ConvertArgs, EncodeArgs};

/// Prints every registered format with its tool status.
pub fn codecs(orchestrator: &ConversionOrchestrator, args: &CodecsArgs) -> Result<()> {
    let registry = orchestrator.registry();
    let infos = registry.infos();

    if args.json {
        let json = serde_json::to_string_pretty(&infos).context("Failed to serialize codecs")?;
        println!("{}", json);
        return Ok(());
    }

    for info in &infos {
        let tool = registry
            .get(info.format)
            .map(|a| a.executable_name().to_string())
            .unwrap_or_default();
        let path = info
            .executable_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<5} {:<8} {:<10} {}",
            info.format, tool, info.tool_version, path
        );

        if args.presets {
            if let Some(adapter) = registry.get(info.format) {
                for preset in adapter.presets() {
                    let marker = if preset.is_default { "*" } else { " " };
                    println!("      {} {}", marker, preset.label);
                }
            }
        }
    }

    match orchestrator.default_format() {
        Some(format) => println!("default: {}", format),
        None => println!("default: none (no encoder installed)"),
    }
    Ok(())
}

/// Converts one file, printing progress until it finishes.
pub async fn convert(orchestrator: &ConversionOrchestrator, args: &ConvertArgs) -> Result<()> {
    let format = resolve_format(orchestrator, &args.encode)?;
    let options = args.encode.to_options(format);
    let request = match &args.output {
        Some(output) => ConversionRequest::new(args.input.clone(), output.clone(), options),
        None => ConversionRequest::alongside(args.input.clone(), options),
    };

    let events = orchestrator.subscribe().await;
    let conversion = {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.convert(request).await }
    };

    let result = drive(orchestrator, events, conversion).await;
    match result {
        Ok(result) => {
            info!(
                "Converted {} in {:.1}s",
                result.output_path.display(),
                result.duration.as_secs_f64()
            );
            Ok(())
        }
        Err(OrchestratorError::Canceled) => bail!("Conversion canceled"),
        Err(e) => Err(anyhow!(e)).context("Conversion failed"),
    }
}

/// Converts several files in order, printing progress until the batch ends.
pub async fn batch(orchestrator: &ConversionOrchestrator, args: &BatchArgs) -> Result<()> {
    let format = resolve_format(orchestrator, &args.encode)?;
    let mut request = BatchRequest::new(args.inputs.clone(), args.encode.to_options(format));
    if let Some(dir) = &args.output_dir {
        request = request.with_output_dir(dir);
    }

    let events = orchestrator.subscribe().await;
    let run = {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run_batch(request).await }
    };

    let summary = drive(orchestrator, events, run)
        .await
        .context("Batch rejected")?;
    report_summary(&summary)
}

fn resolve_format(
    orchestrator: &ConversionOrchestrator,
    encode: &EncodeArgs,
) -> Result<AudioFormat> {
    match encode.format {
        Some(format) => Ok(format),
        None => orchestrator
            .default_format()
            .context("No encoder is installed; run `audioconv codecs` for details"),
    }
}

fn report_summary(summary: &BatchSummary) -> Result<()> {
    println!(
        "{} of {} converted, {} failed, {} canceled",
        summary.succeeded, summary.total, summary.failed, summary.canceled
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.input_path.display(), failure.message);
    }

    if summary.aborted {
        bail!("Batch canceled after {} of {} files", summary.processed(), summary.total);
    }
    if summary.failed > 0 {
        bail!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(())
}

/// Polls `work` while printing events, canceling on Ctrl+C.
async fn drive<T>(
    orchestrator: &ConversionOrchestrator,
    mut events: mpsc::UnboundedReceiver<ConversionEvent>,
    work: impl Future<Output = T>,
) -> T {
    tokio::pin!(work);
    let mut interrupted = false;

    loop {
        tokio::select! {
            output = &mut work => {
                // Events are queued before the result resolves
                while let Ok(event) = events.try_recv() {
                    print_event(&event);
                }
                return output;
            }
            Some(event) = events.recv() => print_event(&event),
            _ = signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, canceling conversion");
                interrupted = true;
                orchestrator.cancel().await;
            }
        }
    }
}

fn print_event(event: &ConversionEvent) {
    match event {
        ConversionEvent::Started {
            input_path,
            output_path,
            format,
            batch_index,
            ..
        } => {
            let position = batch_index
                .map(|i| format!("[{}] ", i + 1))
                .unwrap_or_default();
            eprintln!(
                "{}{} -> {} ({})",
                position,
                input_path.display(),
                output_path.display(),
                format
            );
        }
        ConversionEvent::Progress { percent, .. } => {
            eprint!("\r{:>3}%", percent);
            let _ = std::io::stderr().flush();
        }
        ConversionEvent::Finished {
            input_path,
            outcome,
            ..
        } => match outcome {
            JobOutcome::Succeeded => eprintln!("\rdone"),
            JobOutcome::Failed(err) => eprintln!("\rfailed: {}: {}", input_path.display(), err),
            JobOutcome::Canceled => eprintln!("\rcanceled"),
        },
        ConversionEvent::BatchFinished(_) => {}
    }
}
