use replay2png::{CollectionJob, FrameErrorKind, Job, JobConfig, Manifest, SessionJob};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_pattern(path: &Path, size: usize, seed: u8) {
    let mut data = vec![0u8; size];
    for (idx, b) in data.iter_mut().enumerate() {
        *b = seed.wrapping_add((idx % 251) as u8);
    }
    fs::write(path, data).expect("write raw frame");
}

fn write_manifest(dir: &Path, value: &Value) -> PathBuf {
    let path = dir.join("replay.json");
    fs::write(&path, serde_json::to_vec(value).expect("serialize")).expect("write manifest");
    path
}

fn config(workers: usize, rewrite: bool) -> JobConfig {
    JobConfig {
        workers,
        rewrite_manifest: rewrite,
        ..JobConfig::default()
    }
}

fn telemetry(i: u64) -> Value {
    json!({
        "timestamp": 1000 + i,
        "imu": [0.125, -9.81, 1e-9],
        "jointAngles": [0.0, 1.5707963267948966],
        "sonarValid": [true, false],
        "ballDetectionData": {"candidates": [{"center": [10, 20], "confidence": 0.75, "radius": 4}], "lastCandidates": []}
    })
}

#[test]
fn two_frame_scenario() {
    let tmp = TempDir::new().unwrap();
    write_pattern(&tmp.path().join("a.422"), 4 * 4 * 4, 3);
    fs::write(tmp.path().join("b.422"), [1u8, 2, 3]).unwrap();
    let manifest = write_manifest(
        tmp.path(),
        &json!({
            "config": [],
            "frames": [
                {"topImage": "a.422", "imageSize422": [4, 4]},
                {"bottomImage": "b.422", "imageSize422": [4, 4]}
            ]
        }),
    );

    let mut job = SessionJob::new(&manifest, tmp.path(), config(2, true));
    let summary = job.execute().expect("frame failures are not fatal");

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].source, tmp.path().join("b.422"));
    assert!(summary.failures[0].message.starts_with("malformed frame"));

    let img = image::open(tmp.path().join("a.png")).unwrap();
    assert_eq!((img.width(), img.height()), (8, 4));
    assert!(!tmp.path().join("b.png").exists());

    let saved = Manifest::load(&manifest).unwrap();
    assert_eq!(saved.frames[0].top_image(), Some("a.png"));
    assert_eq!(saved.frames[1].bottom_image(), Some("b.422"));
}

#[test]
fn rewrite_changes_only_converted_top_images() {
    let tmp = TempDir::new().unwrap();
    let mut frames = Vec::new();
    for i in 0..6u64 {
        let mut record = telemetry(i);
        let name = format!("img_{i}.422");
        let camera = if i % 2 == 0 { "topImage" } else { "bottomImage" };
        record[camera] = json!(name);
        record["imageSize422"] = json!([2, 2]);
        // frame 4 is a top frame with no raw file behind it
        if i != 4 {
            write_pattern(&tmp.path().join(&name), 2 * 2 * 4, i as u8);
        }
        frames.push(record);
    }
    let original = json!({"config": [{"robot": "nao", "gain": 2.5}], "frames": frames});
    let manifest_path = write_manifest(tmp.path(), &original);
    let loaded = Manifest::load(&manifest_path).unwrap();

    let mut job = SessionJob::new(&manifest_path, tmp.path(), config(3, true));
    let summary = job.execute().unwrap();
    assert_eq!(summary.converted, 5);
    let missing = &job.frames()[4];
    assert!(!missing.absolute_output_path.exists());

    let saved = Manifest::load(&manifest_path).unwrap();
    assert_eq!(saved.config(), loaded.config());
    assert_eq!(saved.frames.len(), loaded.frames.len());
    for (i, (before, after)) in loaded.frames.iter().zip(&saved.frames).enumerate() {
        let before_keys: Vec<_> = before.fields().keys().collect();
        let after_keys: Vec<_> = after.fields().keys().collect();
        assert_eq!(before_keys, after_keys, "frame {i} key order");
        for (key, value) in before.fields() {
            let expected = if key == "topImage" && i % 2 == 0 && i != 4 {
                json!(format!("img_{i}.png"))
            } else {
                value.clone()
            };
            assert_eq!(after.fields()[key], expected, "frame {i} field {key}");
        }
    }
}

#[test]
fn without_rewrite_manifest_bytes_are_untouched() {
    let tmp = TempDir::new().unwrap();
    write_pattern(&tmp.path().join("a.422"), 16, 0);
    let manifest_path = write_manifest(
        tmp.path(),
        &json!({"frames": [{"topImage": "a.422", "imageSize422": [2, 2]}]}),
    );
    let before = fs::read(&manifest_path).unwrap();

    SessionJob::new(&manifest_path, tmp.path().join("out"), config(1, false))
        .execute()
        .unwrap();

    assert_eq!(fs::read(&manifest_path).unwrap(), before);
    assert!(tmp.path().join("out/a.png").is_file());
}

#[test]
fn repeated_runs_produce_identical_images() {
    let tmp = TempDir::new().unwrap();
    let mut frames = Vec::new();
    for i in 0..4 {
        let name = format!("f{i}.422");
        write_pattern(&tmp.path().join(&name), 8 * 6 * 4, i * 40);
        frames.push(json!({"topImage": name, "imageSize422": [8, 6]}));
    }
    let manifest_path = write_manifest(tmp.path(), &json!({"frames": frames}));

    let run = |out: &str| {
        let out = tmp.path().join(out);
        SessionJob::new(&manifest_path, &out, config(4, false)).execute().unwrap();
        (0..4)
            .map(|i| fs::read(out.join(format!("f{i}.png"))).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run("first"), run("second"));
}

#[test]
fn result_count_is_independent_of_worker_count() {
    let tmp = TempDir::new().unwrap();
    let mut frames = Vec::new();
    for i in 0..13 {
        let name = format!("f{i}.422");
        // every fifth frame is truncated
        let len = if i % 5 == 0 { 5 } else { 4 };
        write_pattern(&tmp.path().join(&name), len, i as u8);
        frames.push(json!({"topImage": name, "imageSize422": [1, 1]}));
    }
    let manifest_path = write_manifest(tmp.path(), &json!({"frames": frames}));

    for workers in [1, 2, 5, 64] {
        let out = tmp.path().join(format!("out{workers}"));
        let summary = SessionJob::new(&manifest_path, &out, config(workers, false))
            .execute()
            .unwrap();
        assert_eq!(summary.frames, 13);
        assert_eq!(summary.converted + summary.failed(), 13, "workers={workers}");
        assert_eq!(summary.failed(), 3);
    }
}

#[test]
fn source_errors_are_reported_per_frame() {
    let tmp = TempDir::new().unwrap();
    let manifest_path = write_manifest(
        tmp.path(),
        &json!({"frames": [{"bottomImage": "gone.422", "imageSize422": [1, 1]}]}),
    );
    let mut job = SessionJob::new(&manifest_path, tmp.path(), config(2, false));
    job.pre_prepare().unwrap();
    job.prepare().unwrap();
    let frame = job.frames()[0].clone();
    let summary = job.run().unwrap();
    assert_eq!(summary.failed(), 1);
    assert_eq!(
        replay2png::convert_job(&frame).unwrap_err().kind(),
        FrameErrorKind::SourceOpen
    );
}

#[test]
fn collection_converts_each_session_into_output_tree() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("logs");
    for robot in ["10.1.24.33", "10.1.24.35"] {
        let data = root.join(robot).join("replay_2019");
        fs::create_dir_all(&data).unwrap();
        write_pattern(&data.join("top.422"), 16, 9);
        write_manifest(
            &data,
            &json!({"config": [], "frames": [{"topImage": "top.422", "imageSize422": [2, 2]}]}),
        );
    }
    // not a session, must be ignored
    fs::create_dir_all(root.join("misc").join("replay_x")).unwrap();

    let out = tmp.path().join("out");
    let mut job = CollectionJob::new(&root, &out, config(2, true));
    let summary = job.execute().unwrap();

    assert_eq!(summary.sessions, 2);
    assert_eq!(summary.converted, 2);
    for robot in ["10.1.24.33", "10.1.24.35"] {
        assert!(out.join(robot).join("replay_2019/top.png").is_file());
        let saved = Manifest::load(&root.join(robot).join("replay_2019/replay.json")).unwrap();
        assert_eq!(saved.frames[0].top_image(), Some("top.png"));
    }
    assert!(!out.join("misc").exists());
}

#[test]
fn invalid_record_aborts_before_any_conversion() {
    let tmp = TempDir::new().unwrap();
    write_pattern(&tmp.path().join("a.422"), 4, 0);
    let manifest_path = write_manifest(
        tmp.path(),
        &json!({"frames": [
            {"topImage": "a.422", "imageSize422": [1, 1]},
            {"imageSize422": [1, 1]}
        ]}),
    );
    let err = SessionJob::new(&manifest_path, tmp.path(), config(2, true))
        .execute()
        .unwrap_err();
    assert!(matches!(err, replay2png::Error::InvalidRecord { index: 1, .. }));
    assert!(!tmp.path().join("a.png").exists());
}

#[test]
fn rewritten_manifest_survives_repeated_runs() {
    let tmp = TempDir::new().unwrap();
    write_pattern(&tmp.path().join("a.422"), 4 * 2 * 4, 1);
    let manifest_path = write_manifest(
        tmp.path(),
        &json!({"Config": null, "frames": [{"topImage": "a.422", "imageSize422": [4, 2]}]}),
    );

    for _ in 0..3 {
        let summary = SessionJob::new(&manifest_path, tmp.path(), config(2, true))
            .execute()
            .unwrap();
        assert_eq!(summary.failed(), 0);
        let img = image::open(tmp.path().join("a.png")).unwrap();
        assert_eq!((img.width(), img.height()), (8, 2));
    }

    let saved: Value = serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
    assert_eq!(saved, json!({"Config": null, "frames": [{"topImage": "a.png", "imageSize422": [4, 2]}]}));
}
