// Command line front end: extract one document and print a JSON envelope.

use chrono::Local;
use clap::Parser;
use hawiya::{
    document_extractor::AUTO_DETECT,
    models::DocumentType,
    processing::{transform::post_process, OcrEngines},
    DocumentExtractor, ExtractionError, ExtractorConfig,
};
use log::{error, info};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "hawiya")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract fields from Moroccan ID cards and vehicle registration cards", long_about = None)]
struct Cli {
    /// Image of the document to read
    #[arg(required_unless_present = "list_types")]
    image: Option<PathBuf>,

    /// Document type (cin_old, cin_new, carte_grise_recto, carte_grise_verso) or auto
    #[arg(long = "type", default_value = AUTO_DETECT)]
    document_type: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the ID-card zone templates
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Tesseract data directory, defaults to TESSDATA_PREFIX
    #[arg(long)]
    tessdata: Option<String>,

    /// Write the ID-card crop zones drawn over the resized image here
    #[arg(long = "debug-image")]
    debug_image: Option<PathBuf>,

    /// Print field values with spaces as date separators
    #[arg(long = "spaced-dates")]
    spaced_dates: bool,

    /// Skip the Arabic/French name cross-check
    #[arg(long = "no-name-check")]
    no_name_check: bool,

    /// List supported document types and exit
    #[arg(long = "list-types")]
    list_types: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn build_config(cli: &Cli) -> Result<ExtractorConfig, ExtractionError> {
    let mut config = match &cli.config {
        Some(path) => ExtractorConfig::from_file(path)?,
        None => ExtractorConfig::default(),
    };
    if let Some(dir) = &cli.templates {
        config.template_dir = dir.clone();
    }
    if let Some(tessdata) = &cli.tessdata {
        config.tessdata_path = Some(tessdata.clone());
    }
    if let Some(path) = &cli.debug_image {
        config.debug_image = Some(path.clone());
    }
    if cli.no_name_check {
        config.name_check = false;
    }
    let config = config.with_env();
    config.validate()?;
    Ok(config)
}

fn list_types() -> serde_json::Value {
    let types: Vec<serde_json::Value> = DocumentType::ALL
        .iter()
        .map(|t| json!({ "type": t.as_str(), "description": t.description() }))
        .collect();
    json!({ "success": true, "document_types": types })
}

fn error_envelope(err: &ExtractionError, document_type: &str) -> serde_json::Value {
    json!({
        "success": false,
        "error": err.kind(),
        "message": err.to_string(),
        "document_type": document_type,
    })
}

fn run(cli: &Cli, image: &Path) -> Result<serde_json::Value, ExtractionError> {
    let total = Instant::now();
    let config = build_config(cli)?;
    let engines = OcrEngines::tesseract(&config)?;
    let extractor = DocumentExtractor::new(config, engines);

    let extraction = Instant::now();
    let (document_type, mut data) = extractor.extract(image, &cli.document_type)?;
    let extraction_seconds = extraction.elapsed().as_secs_f64();

    if cli.spaced_dates {
        data = post_process(data);
    }

    let filename = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(json!({
        "success": true,
        "document_type": document_type,
        "data": data,
        "processing_time": {
            "extraction_seconds": round_seconds(extraction_seconds),
            "total_seconds": round_seconds(total.elapsed().as_secs_f64()),
        },
        "metadata": {
            "filename": filename,
            "timestamp": Local::now().to_rfc3339(),
        },
    }))
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialise output: {}", e),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_types {
        print_json(&list_types());
        return ExitCode::SUCCESS;
    }

    let Some(image) = cli.image.as_deref() else {
        eprintln!("An image path is required");
        return ExitCode::FAILURE;
    };

    info!("Processing {} as {}", image.display(), cli.document_type);
    match run(&cli, image) {
        Ok(envelope) => {
            print_json(&envelope);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Extraction failed: {}", err);
            print_json(&error_envelope(&err, &cli.document_type));
            ExitCode::FAILURE
        }
    }
}
