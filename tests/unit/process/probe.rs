use super::*;

const SAMPLE: &str = r#"{
  "streams": [
    { "index": 0, "codec_type": "video", "width": 640, "height": 360, "duration": "10.010000" },
    { "index": 1, "codec_type": "audio", "duration": "9.984000" }
  ],
  "format": { "duration": "10.010000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2" }
}"#;

#[test]
fn parses_dimensions_audio_and_durations() {
    let info = parse_probe_json(SAMPLE.as_bytes()).unwrap();
    assert_eq!((info.width, info.height), (640, 360));
    assert!(info.has_audio);
    assert_eq!(info.duration, Some(10.01));
    assert_eq!(info.streams.len(), 2);
    assert_eq!(info.streams[1].codec_type, "audio");
    assert_eq!(info.streams[1].duration, Some(9.984));
}

#[test]
fn still_images_have_no_audio() {
    let json = r#"{ "streams": [ { "codec_type": "video", "width": 500, "height": 500 } ],
                    "format": {} }"#;
    let info = parse_probe_json(json.as_bytes()).unwrap();
    assert!(!info.has_audio);
    assert_eq!(info.duration, None);
    assert_eq!(info.streams[0].duration, None);
}

#[test]
fn missing_video_stream_is_rejected() {
    let json = r#"{ "streams": [ { "codec_type": "audio" } ] }"#;
    assert!(
        parse_probe_json(json.as_bytes())
            .unwrap_err()
            .to_string()
            .contains("no video stream")
    );
}

#[test]
fn garbage_is_rejected() {
    assert!(parse_probe_json(b"not json").is_err());
}
