use super::*;

#[test]
fn empty_json_uses_defaults() {
    let cfg = Config::from_json(b"{}").unwrap();
    assert_eq!(cfg.memory_cap_bytes, 8_000_000);
    assert_eq!(cfg.default_length_secs, 15);
    assert_eq!(cfg.gif_fps, 20);
    assert!(cfg.max_processes >= 2);
    assert!(cfg.gif_workers >= 1);
}

#[test]
fn fields_override_defaults() {
    let cfg = Config::from_json(br#"{ "max_processes": 3, "attach_limit_bytes": 25000000 }"#)
        .unwrap();
    assert_eq!(cfg.max_processes, 3);
    assert_eq!(cfg.attach_limit_bytes, 25_000_000);
}

#[test]
fn zero_workers_are_rejected() {
    assert!(Config::from_json(br#"{ "max_processes": 0 }"#).is_err());
    assert!(Config::from_json(br#"{ "gif_workers": 0 }"#).is_err());
}

#[test]
fn unknown_fields_are_rejected() {
    let err = Config::from_json(br#"{ "max_procs": 2 }"#).unwrap_err();
    assert!(err.to_string().contains("invalid config"));
}

#[test]
fn publish_dir_requires_url() {
    assert!(Config::from_json(br#"{ "output_dir": "/tmp/out" }"#).is_err());
    assert!(
        Config::from_json(br#"{ "output_dir": "/tmp/out", "output_url": "https://x/" }"#).is_ok()
    );
}
