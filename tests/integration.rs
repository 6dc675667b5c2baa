use image::{Rgb, RgbImage};
use watermark_inpaint::{
    Algorithm, BatchCoordinator, BatchStatus, BoundingBox, Mask, MaskEditor, PointerButton,
    ProcessOptions, WatermarkEngine,
};

/// Uniform background with a bright opaque square at `(x0, y0)`.
fn square_on_flat(size: u32, x0: u32, y0: u32, side: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(size, size, Rgb([90, 90, 90]));
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            img.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    img
}

/// Smooth two-axis gradient with no features to detect.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let (r, g) = ((x * 255 / width) as u8, (y * 255 / height) as u8);
        Rgb([r, g, 128])
    })
}

fn square_mask(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> Mask {
    let mut mask = Mask::new(width, height);
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            mask.set(x, y, true);
        }
    }
    mask
}

fn mean_abs_diff_in_mask(a: &RgbImage, b: &RgbImage, mask: &Mask) -> f64 {
    let mut total = 0u64;
    let mut n = 0u64;
    for (x, y, pa) in a.enumerate_pixels() {
        if !mask.is_masked(x, y) {
            continue;
        }
        let pb = b.get_pixel(x, y);
        for c in 0..3 {
            total += u64::from(pa[c].abs_diff(pb[c]));
        }
        n += 3;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = total as f64 / n.max(1) as f64;
    mean
}

#[test]
fn detects_bright_square_on_flat_background() {
    let engine = WatermarkEngine::default();
    let img = square_on_flat(200, 20, 20, 40);
    let truth = BoundingBox {
        x: 20,
        y: 20,
        width: 40,
        height: 40,
    };

    let mask = engine.detect(&img, false).unwrap();
    assert!(!mask.is_empty());
    let found = mask.bounding_box().unwrap();
    assert!(found.iou(&truth) >= 0.5, "bbox {found:?}");

    // Default path: aggressive growth must still overlap the square.
    let grown = engine.detect(&img, true).unwrap().bounding_box().unwrap();
    assert!(grown.iou(&truth) >= 0.5, "aggressive bbox {grown:?}");
    assert!(grown.x <= truth.x && grown.y <= truth.y);
    assert!(grown.x + grown.width >= truth.x + truth.width);
    assert!(grown.y + grown.height >= truth.y + truth.height);
}

#[test]
fn aggressive_detection_is_a_superset() {
    let engine = WatermarkEngine::default();
    let img = square_on_flat(160, 100, 100, 30);
    let plain = engine.detect(&img, false).unwrap();
    let grown = engine.detect(&img, true).unwrap();

    assert!(grown.count() >= plain.count());
    for y in 0..160 {
        for x in 0..160 {
            if plain.is_masked(x, y) {
                assert!(grown.is_masked(x, y), "({x}, {y}) lost");
            }
        }
    }
}

#[test]
fn batch_isolates_one_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..5 {
        let path = dir.path().join(format!("img_{i}.png"));
        if i == 2 {
            std::fs::write(&path, b"definitely not a png").unwrap();
        } else {
            square_on_flat(80, 10, 10, 16).save(&path).unwrap();
        }
        paths.push(path);
    }

    let mut batch = BatchCoordinator::new(WatermarkEngine::default());
    for path in &paths {
        batch.enqueue(path.clone());
    }
    let report = batch.process_all();

    assert_eq!(report.done_count(), 4);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].index, 2);
    assert!(report.failed[0].label.contains("img_2.png"));
    assert_eq!(batch.status(2).unwrap(), BatchStatus::Failed);
    for i in [0, 1, 3, 4] {
        assert_eq!(batch.result_for(i).unwrap().dimensions(), (80, 80));
    }

    let out_dir = dir.path().join("out");
    let written = batch.save_results(&out_dir).unwrap();
    assert_eq!(written.len(), 4);
    assert!(!out_dir.join("img_2.png").exists());
}

#[test]
fn second_pass_stays_close_to_first() {
    let engine = WatermarkEngine::default();
    let img = gradient(160, 120);
    let mask = square_mask(160, 120, 70, 50, 20);

    let once = engine
        .remove_with_mask(&img, &mask, Algorithm::Blend)
        .unwrap();
    let twice = engine
        .remove_with_mask(&once, &mask, Algorithm::Blend)
        .unwrap();

    let drift = mean_abs_diff_in_mask(&once, &twice, &mask);
    assert!(drift < 12.0, "drift {drift}");
}

#[test]
fn empty_mask_returns_identical_image() {
    let engine = WatermarkEngine::default();
    let img = gradient(64, 64);
    for algorithm in Algorithm::ALL {
        let out = engine
            .remove_with_mask(&img, &Mask::new(64, 64), algorithm)
            .unwrap();
        assert_eq!(out, img, "{algorithm}");
    }
}

#[test]
fn full_mask_keeps_dimensions() {
    let engine = WatermarkEngine::default();
    let img = gradient(40, 30);
    for algorithm in Algorithm::ALL {
        let out = engine
            .remove_with_mask(&img, &Mask::full(40, 30), algorithm)
            .unwrap();
        assert_eq!(out.dimensions(), (40, 30), "{algorithm}");
    }
}

#[test]
fn processing_is_deterministic() {
    let engine = WatermarkEngine::default();
    let img = square_on_flat(100, 30, 30, 20);
    let a = engine.detect_and_remove(&img, Algorithm::Blend, true).unwrap();
    let b = engine.detect_and_remove(&img, Algorithm::Blend, true).unwrap();
    assert_eq!(a, b);
}

#[test]
fn fixed_mask_removal_is_deterministic() {
    let engine = WatermarkEngine::default();
    let img = gradient(90, 70);
    let mask = square_mask(90, 70, 30, 20, 15);
    for algorithm in Algorithm::ALL {
        let a = engine.remove_with_mask(&img, &mask, algorithm).unwrap();
        let b = engine.remove_with_mask(&img, &mask, algorithm).unwrap();
        assert_eq!(a, b, "{algorithm}");
    }
}

#[test]
fn mismatched_mask_is_resized() {
    let engine = WatermarkEngine::default();
    let img = gradient(120, 80);
    let mask = square_mask(60, 40, 20, 10, 10);
    let out = engine
        .remove_with_mask(&img, &mask, Algorithm::FastMarching)
        .unwrap();
    assert_eq!(out.dimensions(), (120, 80));
}

#[test]
fn removal_flattens_the_square() {
    let engine = WatermarkEngine::new(ProcessOptions {
        algorithm: Algorithm::FastMarching,
        ..ProcessOptions::default()
    });
    let img = square_on_flat(120, 40, 40, 20);
    let mask = engine.detect(&img, true).unwrap();
    let out = engine
        .remove_with_mask(&img, &mask, Algorithm::FastMarching)
        .unwrap();

    let center = out.get_pixel(50, 50);
    assert!(center[0] < 170, "center still bright: {center:?}");
}

#[test]
fn editor_snapshot_drives_the_pipeline() {
    let engine = WatermarkEngine::default();
    let img = gradient(100, 100);

    let mut editor = MaskEditor::new(100, 100);
    editor.pointer_down(PointerButton::Primary, 30, 50);
    editor.pointer_move(70, 50);
    editor.pointer_up();

    let snapshot = editor.snapshot();
    assert!(snapshot.count() > 0);
    let out = engine
        .remove_with_mask(&img, &snapshot, Algorithm::AnisotropicDiffusion)
        .unwrap();
    assert_eq!(out.dimensions(), img.dimensions());
    assert_eq!(editor.mask(), &snapshot);
}

#[test]
fn process_file_writes_default_named_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    square_on_flat(90, 20, 20, 20).save(&input).unwrap();
    let output = watermark_inpaint::default_output_path(&input);

    let result = WatermarkEngine::default().process_file(&input, &output, None);
    assert!(result.success, "{}", result.message);
    assert!(!result.skipped);
    assert_eq!(output, dir.path().join("photo_no_watermark.png"));
    assert!(output.is_file());
}

#[test]
fn process_directory_pairs_masks_by_stem() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("in");
    let mask_dir = dir.path().join("masks");
    let output_dir = dir.path().join("out");
    std::fs::create_dir_all(&input_dir).unwrap();
    std::fs::create_dir_all(&mask_dir).unwrap();

    gradient(50, 50).save(input_dir.join("a.png")).unwrap();
    RgbImage::from_pixel(50, 50, Rgb([70, 80, 90]))
        .save(input_dir.join("b.png"))
        .unwrap();
    square_mask(50, 50, 10, 10, 8)
        .into_gray()
        .save(mask_dir.join("a_mask.png"))
        .unwrap();

    let mut results = WatermarkEngine::default().process_directory(
        &input_dir,
        &output_dir,
        Some(&mask_dir),
        false,
    );
    results.sort_by(|x, y| x.path.cmp(&y.path));

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(results[0].masked_pixels, 64);
    assert!(results[1].skipped);
    assert_eq!(
        results[0].output.as_deref(),
        Some(output_dir.join("a.png").as_path())
    );
    assert!(output_dir.join("b.png").is_file());
}
