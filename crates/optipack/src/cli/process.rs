//! The `optipack process` command: transform a single image file.

use clap::Args;
use optipack_core::{BatchService, Config, InputItem, OutputItem};
use std::path::{Path, PathBuf};

use super::{expand_path, TransformArgs};

/// Arguments for the `process` command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Image file to transform
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to the output name next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub transform: TransformArgs,
}

/// Execute the process command.
pub async fn execute(args: ProcessArgs) -> anyhow::Result<()> {
    let input = expand_path(&args.input);
    anyhow::ensure!(input.is_file(), "Input file not found: {}", input.display());

    let service = BatchService::new(Config::load()?);
    let spec = service.spec_from_form(args.transform.to_form())?;

    let bytes = tokio::fs::read(&input).await?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let output = service.process_one(InputItem::new(name, bytes), spec).await?;

    let destination = match &args.output {
        Some(path) => expand_path(path),
        None => default_destination(&input, &output)?,
    };
    tokio::fs::write(&destination, &output.bytes).await?;

    print_report(&output, &destination);
    Ok(())
}

/// The output name next to the input, refusing to overwrite the input itself.
fn default_destination(input: &Path, output: &OutputItem) -> anyhow::Result<PathBuf> {
    let destination = input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&output.name);
    if destination == input {
        anyhow::bail!(
            "Output would overwrite the input file {}\nUse --output to choose a destination.",
            input.display()
        );
    }
    Ok(destination)
}

fn print_report(output: &OutputItem, destination: &Path) {
    println!("{}", destination.display());
    eprintln!("    Dimensions:   {}x{}", output.width, output.height);
    eprintln!("    Original:     {:>10} bytes", output.original_size);
    eprintln!("    Optimized:    {:>10} bytes", output.optimized_size);
    eprintln!("    Reduction:    {:>9}%", output.reduction_label());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn output(name: &str) -> OutputItem {
        OutputItem {
            name: name.to_string(),
            bytes: Bytes::new(),
            original_size: 10,
            optimized_size: 5,
            width: 1,
            height: 1,
            content_type: "image/png",
        }
    }

    #[test]
    fn test_default_destination_next_to_input() {
        let dest = default_destination(Path::new("/tmp/in/photo.png"), &output("photo.webp")).unwrap();
        assert_eq!(dest, PathBuf::from("/tmp/in/photo.webp"));
    }

    #[test]
    fn test_default_destination_refuses_overwrite() {
        assert!(default_destination(Path::new("/tmp/in/photo.png"), &output("photo.png")).is_err());
    }
}
