use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use scene_watch::config::Config;
use scene_watch::detect::DetectorKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCENE_WATCH_CONFIG",
        "CAMERA_INDEX",
        "CAMERA_WIDTH",
        "CAMERA_HEIGHT",
        "CAMERA_FPS",
        "CAMERA_SOURCE",
        "CONFIDENCE_THRESHOLD",
        "MODEL_PATH",
        "DETECTOR_BACKEND",
        "NODEJS_API_URL",
        "IMAGE_SAVE_PATH",
        "IMAGE_QUALITY",
        "MAX_IMAGE_SIZE_KB",
        "EVENT_COOLDOWN_SECONDS",
        "PROCESS_EVERY_N_FRAMES",
        "LOG_LEVEL",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(toml.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        log_level = "debug"

        [camera]
        index = 2
        width = 1280
        height = 720
        fps = 15

        [detection]
        confidence_threshold = 0.4
        model_path = "/models/yolov8s.onnx"
        backend = "tract"

        [events]
        cooldown_seconds = 2.5
        sample_every_n_frames = 3
        concurrent_dispatch = true

        [images]
        save_path = "/var/lib/scene-watch/events"
        quality = 70
        max_size_kb = 150

        [api]
        base_url = "http://collector.local:5000/"
        "#,
    );

    std::env::set_var("SCENE_WATCH_CONFIG", file.path());
    std::env::set_var("CAMERA_FPS", "25");
    std::env::set_var("EVENT_COOLDOWN_SECONDS", "10");
    std::env::set_var("NODEJS_API_URL", "https://events.example.org");

    let cfg = Config::load().expect("load config");

    assert_eq!(cfg.camera.index, 2);
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.camera.fps, 25);
    assert_eq!(cfg.camera.source, "/dev/video2");
    assert_eq!(cfg.detection.confidence_threshold, 0.4);
    assert_eq!(cfg.detection.backend, DetectorKind::Tract);
    assert_eq!(cfg.detection.model_path.to_str(), Some("/models/yolov8s.onnx"));
    assert_eq!(cfg.events.cooldown, Duration::from_secs(10));
    assert_eq!(cfg.events.sample_every_n_frames, 3);
    assert!(cfg.events.concurrent_dispatch);
    assert_eq!(cfg.images.quality, 70);
    assert_eq!(cfg.images.max_size_kb, 150);
    assert_eq!(cfg.api.base_url, "https://events.example.org");
    assert_eq!(cfg.log_level, "debug");

    clear_env();
}

#[test]
fn camera_source_follows_env_index_unless_set() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMERA_INDEX", "3");
    let cfg = Config::load().expect("load config");
    assert_eq!(cfg.camera.source, "/dev/video3");

    std::env::set_var("CAMERA_SOURCE", "stub://lobby");
    let cfg = Config::load().expect("load config");
    assert_eq!(cfg.camera.source, "stub://lobby");

    clear_env();
}

#[test]
fn rejects_malformed_numeric_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PROCESS_EVERY_N_FRAMES", "five");
    let err = Config::load().unwrap_err();
    assert_eq!(err.kind(), "config");
    assert!(err.to_string().contains("PROCESS_EVERY_N_FRAMES"));

    clear_env();
}

#[test]
fn rejects_out_of_range_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for (key, value) in [
        ("PROCESS_EVERY_N_FRAMES", "0"),
        ("CONFIDENCE_THRESHOLD", "1.5"),
        ("IMAGE_QUALITY", "0"),
        ("MAX_IMAGE_SIZE_KB", "0"),
        ("NODEJS_API_URL", "ftp://collector"),
        ("CAMERA_WIDTH", "0"),
    ] {
        std::env::set_var(key, value);
        assert!(Config::load().is_err(), "{}={} should be rejected", key, value);
        std::env::remove_var(key);
    }

    clear_env();
}

#[test]
fn negative_cooldown_is_rejected_from_file_and_env_alike() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("[events]\ncooldown_seconds = -1.0\n");
    let err = Config::load_from(Some(file.path())).unwrap_err();
    assert_eq!(err.kind(), "config");
    assert!(err.to_string().contains("cooldown_seconds"));

    std::env::set_var("EVENT_COOLDOWN_SECONDS", "-1");
    let err = Config::load_from(None).unwrap_err();
    assert!(err.to_string().contains("EVENT_COOLDOWN_SECONDS"));

    clear_env();
}

#[test]
fn rejects_unknown_keys_in_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("[camera]\nresolution = \"hd\"\n");
    let err = Config::load_from(Some(file.path())).unwrap_err();
    assert_eq!(err.kind(), "config");

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    assert!(Config::load_from(Some(&dir.path().join("absent.toml"))).is_err());

    clear_env();
}
