// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use scanner::constants::{decoder, exit_codes, file_formats, messages, timing};

#[test]
fn test_exit_codes_are_distinct() {
    assert_eq!(exit_codes::SUCCESS, 0);
    assert_ne!(exit_codes::ERROR, exit_codes::SUCCESS);
    assert_ne!(exit_codes::CANCELLED, exit_codes::ERROR);
}

#[test]
fn test_result_messages_not_empty() {
    for message in [
        messages::PERMISSION_DENIED,
        messages::SCAN_CANCELED,
        messages::CAMERA_START_FAILED,
        messages::CAMERA_LOST,
        messages::SESSION_ABORTED,
        messages::GENERIC_FAILURE,
    ] {
        assert!(!message.is_empty());
    }
    assert_eq!(messages::PERMISSION_DENIED, "Camera permission denied");
}

#[test]
fn test_decoder_dimensions() {
    // The default bound must leave room for a QR symbol
    assert!(decoder::DEFAULT_MAX_DIMENSION > decoder::MIN_DIMENSION);
}

#[test]
fn test_image_extensions() {
    assert!(file_formats::is_image_extension("png"));
    assert!(file_formats::is_image_extension("JPG"));
    assert!(!file_formats::is_image_extension("dng"));
}

#[test]
fn test_notice_outlives_a_frame() {
    assert!(timing::NOTICE_DURATION > timing::UI_POLL_INTERVAL);
}
