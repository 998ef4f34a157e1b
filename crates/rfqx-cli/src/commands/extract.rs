//! Extract command - pull fields and images from a single document.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use rfqx_core::{ContainerFormat, DocumentExtraction, FieldValue, MediaMode, Pipeline, PreparedImage};

use super::config::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input document (PDF or DOCX)
    #[arg(required = true)]
    input: PathBuf,

    /// Declared document type: "pdf", "docx" or a media type
    /// (default: from the file extension)
    #[arg(short, long)]
    format: Option<String>,

    /// Output file for the fields (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format for the fields
    #[arg(long, value_enum, default_value = "json")]
    output_format: OutputFormat,

    /// Write prepared images into this directory
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Write prepared images and fields.json into this zip archive
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Render one preview image per PDF page instead of embedded images
    #[arg(long)]
    flattened_preview: bool,

    /// Drop images narrower or shorter than this many pixels
    #[arg(long)]
    min_dimension: Option<u32>,

    /// Downscale images wider than this many pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// Remove the matched label from keyword-proximity values
    #[arg(long)]
    strip_labels: bool,

    /// Also print the flattened document text
    #[arg(long)]
    show_text: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let format = declared_format(&args)?;

    if args.flattened_preview {
        config.reader.media_mode = MediaMode::FlattenedPreview;
    }
    if args.min_dimension.is_some() {
        config.media.min_dimension = args.min_dimension;
    }
    if args.max_width.is_some() {
        config.media.max_width = args.max_width;
    }
    if args.strip_labels {
        config.extraction.strip_label = true;
    }

    let pipeline = Pipeline::new(config)?;

    info!("Processing {} file: {}", format.name(), args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    pb.set_message("Reading document...");
    let data = fs::read(&args.input)?;

    pb.set_message(format!("Extracting from {}...", format.name()));
    let extraction = pipeline.process(&data, format);
    pb.finish_and_clear();
    let extraction = extraction?;

    let output = format_fields(&extraction, args.output_format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if let Some(dir) = &args.images_dir {
        write_images_dir(dir, &extraction.images)?;
        eprintln!(
            "{} {} images written to {}",
            style("✓").green(),
            extraction.images.len(),
            dir.display()
        );
    }

    if let Some(archive_path) = &args.archive {
        write_archive(archive_path, &extraction)?;
        eprintln!(
            "{} Archive written to {}",
            style("✓").green(),
            archive_path.display()
        );
    }

    let report = &extraction.report;
    let skipped = report.dropped_images + report.media.rejected();
    if skipped > 0 {
        eprintln!(
            "{} {} images skipped ({} unreadable, {} undecodable, {} too small, {} unsupported colour)",
            style("ℹ").blue(),
            skipped,
            report.dropped_images,
            report.media.decode_failures,
            report.media.undersized,
            report.media.unsupported_color
        );
    }

    if args.show_text {
        println!();
        println!("{}", style("Document text:").bold());
        println!("{}", extraction.text);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Explicit `--format`, else the file extension. Content is never sniffed.
fn declared_format(args: &ExtractArgs) -> anyhow::Result<ContainerFormat> {
    if let Some(declared) = &args.format {
        return ContainerFormat::from_extension(declared)
            .or_else(|_| ContainerFormat::from_media_type(declared))
            .map_err(|_| anyhow::anyhow!("Unsupported document format: {}", declared));
    }

    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    ContainerFormat::from_extension(extension).map_err(|_| {
        anyhow::anyhow!(
            "Unsupported file format: {:?}. Use --format pdf or --format docx.",
            extension
        )
    })
}

fn format_fields(extraction: &DocumentExtraction, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(extraction)?),
        OutputFormat::Csv => format_csv(extraction),
        OutputFormat::Text => Ok(format_text(extraction)),
    }
}

fn format_csv(extraction: &DocumentExtraction) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["field", "value", "source", "date"])?;

    for field in &extraction.fields {
        let date = field.date.map(|d| d.to_string()).unwrap_or_default();
        wtr.write_record([
            field.name.as_str(),
            field.value.as_str().unwrap_or(""),
            field.source.as_str(),
            date.as_str(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(extraction: &DocumentExtraction) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} document: {}/{} fields found\n\n",
        extraction.format,
        extraction.fields.found_count(),
        extraction.fields.len()
    ));

    for field in &extraction.fields {
        match &field.value {
            FieldValue::Found(value) => {
                output.push_str(&format!("{}: {}\n", field.name, value));
                output.push_str(&format!("  source: {}\n", field.source.as_str()));
                if let Some(date) = field.date {
                    output.push_str(&format!("  date: {}\n", date));
                }
            }
            FieldValue::NotFound => output.push_str(&format!("{}: (not found)\n", field.name)),
        }
    }

    if !extraction.images.is_empty() {
        output.push_str("\nImages:\n");
        for image in &extraction.images {
            output.push_str(&format!(
                "  {} {}x{}{}\n",
                image.file_name,
                image.width,
                image.height,
                if image.rescaled { " (rescaled)" } else { "" }
            ));
        }
    }

    output
}

fn write_images_dir(dir: &Path, images: &[PreparedImage]) -> anyhow::Result<()> {
    fs::create_dir_all(dir)?;
    for image in images {
        let path = dir.join(&image.file_name);
        debug!("Writing {}", path.display());
        fs::write(path, &image.bytes)?;
    }
    Ok(())
}

fn write_archive(path: &Path, extraction: &DocumentExtraction) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default();

    zip.start_file("fields.json", options)?;
    zip.write_all(serde_json::to_string_pretty(&extraction.fields)?.as_bytes())?;

    for image in &extraction.images {
        zip.start_file(format!("images/{}", image.file_name), options)?;
        zip.write_all(&image.bytes)?;
    }

    zip.finish()?;
    Ok(())
}
