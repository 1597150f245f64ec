//! CLI integration tests for the `key` and `generate` subcommands

#![cfg(feature = "cli")]

use std::fs;
use std::process::Command;
use sticker_ai::{ImageCodec, PixelBuffer};
use tempfile::TempDir;

fn sticker_ai() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sticker-ai"))
}

fn write_green_screen(path: &std::path::Path) {
    let mut buffer = PixelBuffer::filled(4, 4, [0, 255, 0, 255]).unwrap();
    buffer.set_pixel(2, 2, [240, 240, 240, 255]);
    let encoded = ImageCodec::encode_png(buffer).unwrap();
    fs::write(path, encoded.bytes()).expect("Failed to write test image");
}

#[test]
fn test_key_writes_sticker_next_to_input() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("cat.png");
    write_green_screen(&input);

    let output = sticker_ai()
        .args(["key", input.to_str().unwrap()])
        .output()
        .expect("Failed to run sticker-ai");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let sticker = fs::read(temp_dir.path().join("cat-sticker.png")).unwrap();
    let pixels = ImageCodec::decode_bytes(&sticker).unwrap();
    assert_eq!(pixels.pixel(0, 0).unwrap()[3], 0);
    assert_eq!(pixels.pixel(2, 2), Some([240, 240, 240, 255]));
}

#[test]
fn test_key_batch_into_output_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let out_dir = temp_dir.path().join("stickers");
    let inputs = ["a.png", "b.png"].map(|name| {
        let path = temp_dir.path().join(name);
        write_green_screen(&path);
        path
    });

    let status = sticker_ai()
        .arg("key")
        .args(&inputs)
        .arg("-o")
        .arg(&out_dir)
        .status()
        .expect("Failed to run sticker-ai");
    assert!(status.success());

    assert!(out_dir.join("a-sticker.png").is_file());
    assert!(out_dir.join("b-sticker.png").is_file());
}

#[test]
fn test_key_missing_input_fails() {
    let status = sticker_ai()
        .args(["key", "/no/such/input.png"])
        .status()
        .expect("Failed to run sticker-ai");
    assert!(!status.success());
}

#[test]
fn test_generate_without_api_key_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("photo.png");
    write_green_screen(&input);

    let output = sticker_ai()
        .args(["generate", input.to_str().unwrap()])
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .output()
        .expect("Failed to run sticker-ai");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("GEMINI_API_KEY"));
}
