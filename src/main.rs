//! Main entry point for the tiltvault CLI.
//!
//! This binary inspects sketch containers from the local filesystem or
//! remote HTTP servers. Remote containers are accessed through Range
//! requests, so listing or pulling one member never downloads the whole
//! archive.

use anyhow::{Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tiltvault::meta::MetadataReader;
use tiltvault::tilt::{FN_THUMBNAIL, TiltFile};
use tiltvault::{Cli, HttpRangeReader};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if cli.is_http_url() {
        let reader = HttpRangeReader::new(cli.file.clone()).await?;
        let transferred_before = reader.transferred_bytes();
        let reader = Arc::new(reader);

        let tilt = TiltFile::from_reader(reader.clone()).await?;
        process(&tilt, &cli).await?;

        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let tilt = TiltFile::open(Path::new(&cli.file)).await;
        process(&tilt, &cli).await?;
    }

    Ok(())
}

async fn process(tilt: &TiltFile, cli: &Cli) -> Result<()> {
    if cli.check {
        return check(tilt, cli);
    }
    if cli.metadata {
        return print_metadata(tilt, cli).await;
    }
    if let Some(out) = &cli.thumbnail {
        return save_member(tilt, FN_THUMBNAIL, Path::new(out), cli).await;
    }
    if let Some(member) = &cli.extract {
        return extract_to_stdout(tilt, member).await;
    }
    // Default to listing.
    list_members(tilt, cli.verbose);
    Ok(())
}

/// Validate the container and report. Exit status carries the verdict
/// so scripts can use `-c` without parsing output.
fn check(tilt: &TiltFile, cli: &Cli) -> Result<()> {
    if !tilt.is_header_valid() {
        bail!("not a valid sketch container");
    }
    if !cli.is_quiet() {
        let kind = if tilt.is_archive() {
            "archive"
        } else {
            "directory"
        };
        println!("valid sketch container ({})", kind);
    }
    Ok(())
}

fn list_members(tilt: &TiltFile, verbose: bool) {
    if !verbose {
        for name in tilt.member_names() {
            println!("{}", name);
        }
        return;
    }

    let Some(entries) = tilt.archive_entries() else {
        // Directory containers have no compression story; names only.
        for name in tilt.member_names() {
            println!("{}", name);
        }
        return;
    };

    println!("{:>10}  {:>10}  {:>5}  Name", "Length", "Size", "Cmpr");
    println!("{}", "-".repeat(50));
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;
    for entry in entries {
        if entry.is_directory {
            continue;
        }
        println!(
            "{:>10}  {:>10}  {}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            compression_ratio(entry.uncompressed_size, entry.compressed_size),
            entry.file_name
        );
        total_uncompressed += entry.uncompressed_size;
        total_compressed += entry.compressed_size;
        file_count += 1;
    }
    println!("{}", "-".repeat(50));
    println!(
        "{:>10}  {:>10}         {} files",
        total_uncompressed, total_compressed, file_count
    );
}

/// Print the metadata document, upgraded to the current schema.
async fn print_metadata(tilt: &TiltFile, cli: &Cli) -> Result<()> {
    let reader = MetadataReader::new();
    let Some(metadata) = reader.read(tilt).await else {
        match reader.last_error() {
            Some(err) => bail!("cannot read metadata: {}", err),
            None => bail!("container has no metadata"),
        }
    };
    if let Some(err) = reader.last_error() {
        if !cli.is_quiet() {
            eprintln!("warning: {}", err);
        }
    }
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn save_member(tilt: &TiltFile, member: &str, out: &Path, cli: &Cli) -> Result<()> {
    let Some(bytes) = tilt.read_member(member).await else {
        bail!("container has no {} member", member);
    };
    tokio::fs::write(out, &bytes).await?;
    if !cli.is_quiet() {
        println!("wrote {} ({} bytes)", out.display(), bytes.len());
    }
    Ok(())
}

async fn extract_to_stdout(tilt: &TiltFile, member: &str) -> Result<()> {
    let Some(bytes) = tilt.read_member(member).await else {
        bail!("container has no {} member", member);
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

/// Percent saved by compression, clamped to zero for members that grew
/// when compressed.
fn compression_ratio(uncompressed: u64, compressed: u64) -> String {
    let saved = if uncompressed > 0 {
        100u64.saturating_sub(compressed * 100 / uncompressed)
    } else {
        0
    };
    format!("{:>4}%", saved)
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::compression_ratio;

    #[test]
    fn ratio_clamps_when_compression_grew_the_member() {
        assert_eq!(compression_ratio(100, 25), "  75%");
        assert_eq!(compression_ratio(0, 0), "   0%");
        // A deflated member can come out larger than its input.
        assert_eq!(compression_ratio(100, 150), "   0%");
    }
}
