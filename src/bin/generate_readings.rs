// file: generate_readings.rs
// desc: build the readings JSON from KANJIDIC2 for the characters the model knows

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use kanji_doodle_rs::labels::LabelVocabulary;
use kanji_doodle_rs::readings::ReadingsTable;

/// Extract on/kun readings from KANJIDIC2 (http://www.edrdg.org/kanjidic/kanjidic2.xml.gz).
/// KANJIDIC2 is licensed CC BY-SA 4.0.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Uncompressed kanjidic2.xml
    #[arg(long, default_value = "data/kanjidic2.xml")]
    kanjidic: PathBuf,

    /// Label table, one character per line
    #[arg(long, default_value = "model/labels.txt")]
    labels: PathBuf,

    #[arg(long, default_value = "model/readings.json")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let labels = LabelVocabulary::from_lines(&fs::read_to_string(&args.labels)?);
    println!("Supported kanji count: {}", labels.len());

    println!("Parsing {}...", args.kanjidic.display());
    let xml = fs::read_to_string(&args.kanjidic)?;
    let table = ReadingsTable::from_kanjidic(&xml, |c| labels.contains(c))?;
    println!("Extracted readings for {} kanji.", table.len());

    fs::write(&args.output, table.to_json_pretty()?)?;
    println!("Generated: {}", args.output.display());

    Ok(())
}
