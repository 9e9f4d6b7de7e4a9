//! Integration tests for the capture boundary
//!
//! Covers camera listing, constraint handling and device release through the
//! public API only.

use camlink_media::*;

// ============================================================================
// CAMERA LISTING
// ============================================================================

#[tokio::test]
async fn test_unlabelled_devices_get_numbered_labels() {
    let provider = MockCaptureProvider::new(vec![
        VideoDevice::new("a", "", vec![VideoResolution::HD]),
        VideoDevice::new("b", "", vec![VideoResolution::HD]),
    ]);

    let cameras = list_cameras(&provider).await.unwrap();
    let labels: Vec<&str> = cameras.options.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["Camera 1", "Camera 2"]);
    assert_eq!(cameras.default_index, 0);
}

#[tokio::test]
async fn test_listing_with_no_devices_fails() {
    let provider = MockCaptureProvider::new(vec![]);
    let result = list_cameras(&provider).await;
    assert!(matches!(result, Err(MediaError::NoDevices)));
}

// ============================================================================
// CAPTURE LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_full_hd_hint_is_honoured_when_supported() {
    let provider = MockCaptureProvider::phone();
    let stream = provider
        .get_stream(&CaptureConstraints::video(
            Some("back-0"),
            VideoResolution::FULL_HD,
        ))
        .await
        .unwrap();

    let track = stream.video_tracks().next().unwrap();
    assert_eq!(track.resolution(), Some(VideoResolution::FULL_HD));
    assert_eq!(track.kind(), TrackKind::Video);
    assert!(matches!(
        stream.origin(),
        StreamOrigin::Local { device_id } if device_id == "back-0"
    ));
}

#[tokio::test]
async fn test_switching_devices_after_stop() {
    let provider = MockCaptureProvider::phone();

    let back = provider
        .get_stream(&CaptureConstraints::video(Some("back-0"), VideoResolution::FULL_HD))
        .await
        .unwrap();
    back.stop_all_tracks();

    let front = provider
        .get_stream(&CaptureConstraints::video(Some("front-0"), VideoResolution::FULL_HD))
        .await
        .unwrap();

    assert!(!back.is_active());
    assert!(front.is_active());
    assert_eq!(provider.active_stream_count(), 1);
}

#[tokio::test]
async fn test_audio_is_rejected() {
    let provider = MockCaptureProvider::phone();
    let constraints = CaptureConstraints {
        audio: true,
        ..CaptureConstraints::default()
    };

    let err = provider.get_stream(&constraints).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn test_busy_device_until_released() {
    let provider = MockCaptureProvider::phone();
    let constraints = CaptureConstraints::video(Some("back-0"), VideoResolution::HD);

    let first = tokio_test::assert_ok!(tokio_test::block_on(provider.get_stream(&constraints)));
    let err = tokio_test::assert_err!(tokio_test::block_on(provider.get_stream(&constraints)));
    assert!(matches!(err, MediaError::DeviceBusy { ref device_id } if device_id == "back-0"));

    first.stop_all_tracks();
    tokio_test::assert_ok!(tokio_test::block_on(provider.get_stream(&constraints)));
}

#[test]
fn test_withdrawn_permission_blocks_listing() {
    let provider = MockCaptureProvider::phone();
    provider.set_permission(false);

    let err = tokio_test::assert_err!(tokio_test::block_on(list_cameras(&provider)));
    assert_eq!(err.category(), ErrorCategory::Permission);
    assert_eq!(provider.active_stream_count(), 0);
}
