use burn_import::onnx::{ModelGen, RecordType};
use std::env;
use std::path::{Path, PathBuf};

const MODEL_ONNX: &str = "model/kanji.onnx";
const MODEL_LABELS: &str = "model/labels.txt";
const MODEL_READINGS: &str = "model/readings.json";

fn main() {
    println!("cargo::rustc-check-cfg=cfg(kanji_model)");
    println!("cargo::rustc-check-cfg=cfg(kanji_readings)");
    println!("cargo:rerun-if-changed={MODEL_ONNX}");
    println!("cargo:rerun-if-changed={MODEL_LABELS}");
    println!("cargo:rerun-if-changed={MODEL_READINGS}");

    // written by the generate-readings tool
    if Path::new(MODEL_READINGS).exists() {
        println!("cargo:rustc-cfg=kanji_readings");
    }

    // The classifier artifact is not versioned with the crate; without it the
    // library still builds and the bundled loader reports the model as unavailable.
    if !Path::new(MODEL_ONNX).exists() || !Path::new(MODEL_LABELS).exists() {
        println!("cargo:warning={MODEL_ONNX} or {MODEL_LABELS} missing, building without a bundled model");
        return;
    }

    // Get the OUT_DIR where cargo expects build script outputs
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let model_dir = out_dir.join("model");

    // Generate the model code from the ONNX file.
    ModelGen::new()
        .input(MODEL_ONNX)
        .out_dir(model_dir.to_str().unwrap())
        .record_type(RecordType::Bincode)
        .embed_states(true)
        .run_from_script();

    println!("cargo:rustc-cfg=kanji_model");
}
