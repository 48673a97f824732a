//! Image normalization integration tests
//!
//! Run with: `cargo test -p thumbkit-processing --test normalize_test`

mod helpers;

use futures::{FutureExt, StreamExt};
use helpers::fixtures::{create_test_image, create_test_jpeg, create_test_png};
use helpers::{
    assert_progress_complete, normalize_collecting, normalizer_with, test_config, test_normalizer,
};
use image::ImageFormat;
use serde_json::json;
use thumbkit_processing::{
    Dimensions, MediaFormat, MediaKind, MediaSource, NormalizeError, NormalizeOptions,
    ResourceLimit, SUPPORTED_FORMATS,
};

#[test]
fn test_allow_list_is_exhaustive() {
    let normalizer = test_normalizer();
    for format in SUPPORTED_FORMATS {
        let source = MediaSource::from_bytes(format.mime_type(), vec![0u8; 4]);
        assert!(normalizer.is_format_supported(&source), "{}", format);
    }
    for content_type in [
        "image/svg+xml",
        "image/tiff",
        "image/avif",
        "video/x-msvideo",
        "application/pdf",
        "application/octet-stream",
        "",
    ] {
        let source = MediaSource::from_bytes(content_type, vec![0u8; 4]);
        assert!(!normalizer.is_format_supported(&source), "{}", content_type);
    }
}

#[test]
fn test_allow_list_ignores_case_and_parameters() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("IMAGE/PNG", vec![0u8; 4]);
    assert!(normalizer.is_format_supported(&source));
    let source = MediaSource::from_bytes("video/webm; codecs=vp9", vec![0u8; 4]);
    assert!(normalizer.is_format_supported(&source));
}

#[tokio::test]
async fn test_every_image_format_reports_true_dimensions() {
    let normalizer = test_normalizer();
    let cases = [
        (ImageFormat::Png, MediaFormat::Png),
        (ImageFormat::Jpeg, MediaFormat::Jpeg),
        (ImageFormat::Gif, MediaFormat::Gif),
        (ImageFormat::WebP, MediaFormat::WebP),
        (ImageFormat::Bmp, MediaFormat::Bmp),
    ];

    for (encoder, format) in cases {
        let data = create_test_image(37, 21, encoder);
        let source = MediaSource::from_bytes(format.mime_type(), data.clone());
        let (result, progress) =
            normalize_collecting(&normalizer, source, NormalizeOptions::default()).await;

        let descriptor = result.unwrap_or_else(|e| panic!("{} failed: {}", format, e));
        assert_eq!(descriptor.kind(), MediaKind::Image);
        assert_eq!(descriptor.encoded_format(), format);
        assert_eq!(descriptor.dimensions(), Dimensions::new(37, 21).unwrap());
        assert_eq!(descriptor.duration_seconds(), None);
        assert_eq!(descriptor.byte_size(), data.len() as u64);
        assert_eq!(descriptor.source().as_bytes(), &data[..]);
        assert_progress_complete(&progress);
    }
}

#[tokio::test]
async fn test_display_handle_resolves_to_original_bytes() {
    let normalizer = test_normalizer();
    let data = create_test_png(16, 16);
    let descriptor = normalizer
        .normalize(
            MediaSource::from_bytes("image/png", data.clone()),
            NormalizeOptions::default(),
        )
        .unwrap()
        .await
        .unwrap();

    let content = normalizer
        .registry()
        .resolve(descriptor.display_uri())
        .expect("display handle is live");
    assert_eq!(&content.bytes[..], &data[..]);
    assert_eq!(content.format, MediaFormat::Png);
    assert_eq!(descriptor.display_format(), MediaFormat::Png);
    assert_eq!(descriptor.display_dimensions(), descriptor.dimensions());
    assert_eq!(descriptor.color_type(), Some("Rgba8"));
    assert!(descriptor.framerate().is_none());
}

#[tokio::test]
async fn test_corrupt_image_is_decode_error() {
    let normalizer = test_normalizer();
    let mut data = create_test_png(64, 64);
    data.truncate(data.len() / 2);

    let (result, progress) = normalize_collecting(
        &normalizer,
        MediaSource::from_bytes("image/png", data),
        NormalizeOptions::default(),
    )
    .await;

    assert!(
        matches!(result, Err(NormalizeError::Decode { .. })),
        "got {:?}",
        result
    );
    assert!(!progress.contains(&100));
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_mislabelled_image_is_decode_error() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/jpeg", create_test_png(8, 8));
    let (result, _) = normalize_collecting(&normalizer, source, NormalizeOptions::default()).await;
    assert!(matches!(result, Err(NormalizeError::Decode { .. })));
}

#[test]
fn test_short_body_is_rejected_before_decoding() {
    let normalizer = test_normalizer();
    let data = create_test_png(32, 32);
    let declared = data.len() as u64;
    let source = MediaSource::new("image/png", declared, data[..data.len() - 10].to_vec());

    match normalizer.normalize(source, NormalizeOptions::default()) {
        Err(NormalizeError::Decode { reason, .. }) => assert!(reason.contains("truncated")),
        other => panic!("Expected Decode, got {:?}", other),
    }
}

#[test]
fn test_unsupported_type_is_rejected() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/svg+xml", b"<svg/>".to_vec());
    match normalizer.normalize(source, NormalizeOptions::default()) {
        Err(NormalizeError::UnsupportedFormat { content_type }) => {
            assert_eq!(content_type, "image/svg+xml")
        }
        other => panic!("Expected UnsupportedFormat, got {:?}", other),
    }
}

#[test]
fn test_extension_mismatch_is_unsupported() {
    let normalizer = test_normalizer();
    let source =
        MediaSource::from_bytes("image/png", create_test_png(4, 4)).with_filename("clip.mp4");
    assert!(matches!(
        normalizer.normalize(source, NormalizeOptions::default()),
        Err(NormalizeError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_oversized_file_is_resource_exhausted() {
    let mut config = test_config();
    config.max_image_bytes = 1024;
    let normalizer = normalizer_with(config);

    let source = MediaSource::new("image/png", 4096, vec![0u8; 4096]);
    match normalizer.normalize(source, NormalizeOptions::default()) {
        Err(NormalizeError::ResourceExhausted { limit, actual, max }) => {
            assert_eq!(limit, ResourceLimit::SourceBytes);
            assert_eq!(actual, 4096);
            assert_eq!(max, 1024);
        }
        other => panic!("Expected ResourceExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_dimensions_are_resource_exhausted() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(5000, 4));

    let (result, _) = normalize_collecting(&normalizer, source, NormalizeOptions::default()).await;
    match result {
        Err(NormalizeError::ResourceExhausted { limit, actual, max }) => {
            assert_eq!(limit, ResourceLimit::SourceDimension);
            assert_eq!(actual, 5000);
            assert_eq!(max, 4096);
        }
        other => panic!("Expected ResourceExhausted, got {:?}", other),
    }
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_max_dimension_downscales_display_only() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(800, 400));
    let options = NormalizeOptions::default().with_max_dimension(200);

    let (result, progress) = normalize_collecting(&normalizer, source, options).await;
    let descriptor = result.unwrap();

    assert_eq!(descriptor.dimensions(), Dimensions::new(800, 400).unwrap());
    assert_eq!(
        descriptor.display_dimensions(),
        Dimensions::new(200, 100).unwrap()
    );
    assert_progress_complete(&progress);

    let content = descriptor.display().content().unwrap();
    let rendered = image::load_from_memory(&content.bytes).unwrap();
    assert_eq!((rendered.width(), rendered.height()), (200, 100));
}

#[tokio::test]
async fn test_max_dimension_never_upscales() {
    let normalizer = test_normalizer();
    let data = create_test_png(50, 30);
    let source = MediaSource::from_bytes("image/png", data.clone());
    let options = NormalizeOptions::default().with_max_dimension(500);

    let descriptor = normalizer.normalize(source, options).unwrap().await.unwrap();
    assert_eq!(descriptor.display_dimensions(), descriptor.dimensions());
    assert_eq!(&descriptor.display().content().unwrap().bytes[..], &data[..]);
}

#[tokio::test]
async fn test_target_format_transcodes_display() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/jpeg", create_test_jpeg(40, 40));
    let options = NormalizeOptions::default().with_target_format("png");

    let descriptor = normalizer.normalize(source, options).unwrap().await.unwrap();
    assert_eq!(descriptor.encoded_format(), MediaFormat::Jpeg);
    assert_eq!(descriptor.display_format(), MediaFormat::Png);

    let content = descriptor.display().content().unwrap();
    assert_eq!(image::guess_format(&content.bytes).unwrap(), ImageFormat::Png);
    assert_eq!(content.content_type(), "image/png");
}

#[test]
fn test_incompatible_target_format_is_unsupported() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(4, 4));
    let options = NormalizeOptions::default().with_target_format("webm");
    assert!(matches!(
        normalizer.normalize(source, options),
        Err(NormalizeError::UnsupportedFormat { .. })
    ));
}

#[tokio::test]
async fn test_unknown_option_keys_are_ignored() {
    let normalizer = test_normalizer();
    let options = NormalizeOptions::from_json(json!({
        "maxDimension": 10,
        "quality": 80,
        "strip": true
    }))
    .unwrap();

    let source = MediaSource::from_bytes("image/png", create_test_png(20, 10));
    let descriptor = normalizer.normalize(source, options).unwrap().await.unwrap();
    assert_eq!(
        descriptor.display_dimensions(),
        Dimensions::new(10, 5).unwrap()
    );
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(8, 8));
    let descriptor = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap()
        .await
        .unwrap();
    let uri = descriptor.display_uri().to_string();
    assert_eq!(normalizer.registry().active_handles(), 1);

    assert!(descriptor.release());
    assert!(!descriptor.release());
    assert!(descriptor.is_released());
    assert!(normalizer.registry().resolve(&uri).is_none());
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_dropping_descriptor_releases_handle() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(8, 8));
    let descriptor = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap()
        .await
        .unwrap();
    let uri = descriptor.display_uri().to_string();

    drop(descriptor);
    assert!(normalizer.registry().resolve(&uri).is_none());
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_each_normalization_gets_its_own_handle() {
    let normalizer = test_normalizer();
    let data = create_test_png(8, 8);
    let first = normalizer
        .normalize(
            MediaSource::from_bytes("image/png", data.clone()),
            NormalizeOptions::default(),
        )
        .unwrap()
        .await
        .unwrap();
    let second = normalizer
        .normalize(
            MediaSource::from_bytes("image/png", data),
            NormalizeOptions::default(),
        )
        .unwrap()
        .await
        .unwrap();

    assert_ne!(first.display_uri(), second.display_uri());
    first.release();
    assert!(normalizer.registry().resolve(second.display_uri()).is_some());
}

#[tokio::test]
async fn test_cancelled_job_registers_nothing() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(256, 256));
    let mut job = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap();
    let progress = job.take_progress().unwrap();

    job.cancel();
    let (result, values) = tokio::join!(job.run(), progress.collect::<Vec<u8>>());

    assert!(matches!(result, Err(NormalizeError::Cancelled)));
    assert!(!values.contains(&100));
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_cancellation_token_aborts_job() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(64, 64));
    let job = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap();

    let token = job.cancellation_token();
    token.cancel();
    assert!(matches!(job.await, Err(NormalizeError::Cancelled)));
    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_dropped_job_leaves_no_handle() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(1024, 1024));
    let job = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap();

    // Poll once so the decode starts, then drop the future
    let polled = job.run().now_or_never();
    drop(polled);

    assert_eq!(normalizer.registry().active_handles(), 0);
}

#[tokio::test]
async fn test_normalize_with_progress_callback() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/png", create_test_png(128, 96));
    let mut seen = Vec::new();

    let descriptor = normalizer
        .normalize_with_progress(
            source,
            NormalizeOptions::default().with_max_dimension(64),
            |percent| seen.push(percent),
        )
        .await
        .unwrap();

    assert_eq!(descriptor.display_dimensions(), Dimensions::new(64, 48).unwrap());
    assert_progress_complete(&seen);
}

#[tokio::test]
async fn test_from_path_infers_content_type() {
    let normalizer = test_normalizer();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    tokio::fs::write(&path, create_test_png(12, 9)).await.unwrap();

    let source = MediaSource::from_path(&path, None).await.unwrap();
    assert_eq!(source.content_type(), "image/png");
    assert_eq!(source.filename(), Some("photo.png"));

    let descriptor = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(descriptor.dimensions(), Dimensions::new(12, 9).unwrap());
}

#[tokio::test]
async fn test_summary_serializes_descriptor() {
    let normalizer = test_normalizer();
    let source = MediaSource::from_bytes("image/gif", create_test_image(6, 3, ImageFormat::Gif));
    let descriptor = normalizer
        .normalize(source, NormalizeOptions::default())
        .unwrap()
        .await
        .unwrap();

    let json = serde_json::to_value(descriptor.summary()).unwrap();
    assert_eq!(json["kind"], "image");
    assert_eq!(json["encodedFormat"], "gif");
    assert_eq!(json["dimensions"], json!({ "width": 6, "height": 3 }));
    assert!(json.get("durationSeconds").is_none());
    assert_eq!(json["displayUri"], descriptor.display_uri());
}
