use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use osd_initiator_rs::{
    cfg::{
        cli::{load_config, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    client::{device::OsdDevice, loopback::LoopbackTarget},
    control_block::cdb::ReqOptions,
    models::common::ObjId,
    security::{SecurityMode, capability::Capability},
};
use serial_test::serial;

use super::common::KEY;

#[test]
fn test_load_config() -> Result<()> {
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    assert_eq!(cfg.device.default_timeout, Duration::from_secs(30));
    assert_eq!(cfg.device.retries, 2);
    assert_eq!(cfg.device.max_attr_segment_bytes, 4096);
    assert_eq!(
        cfg.request.req_options(),
        ReqOptions::FUA | ReqOptions::BYPASS_TIMESTAMPS
    );
    assert_eq!(cfg.request.options.len(), 2, "duplicates are dropped");
    assert_eq!(cfg.key(), Some(&KEY[..]));

    let cap = Capability::from_slice(&cfg.security.capability)?;
    assert_eq!(cap.allowed_obj(), ObjId::ROOT);
    Ok(())
}

#[test]
fn test_device_from_config() -> Result<()> {
    let cfg = load_config(Some("tests/config.yaml"))?;
    let target = LoopbackTarget::with_key(KEY);
    let dev = OsdDevice::init(Arc::new(target.clone()), &cfg.device);
    assert_eq!(dev.default_timeout(), Duration::from_secs(30));
    assert_eq!(dev.default_retries(), 2);

    let req = dev.start_request();
    assert_eq!(req.timeout(), Duration::from_secs(30));
    assert_eq!(req.retries(), 2);

    let finalized = req.create_partition(0x10000).finalize(
        cfg.request.req_options(),
        &cfg.security.capability,
        cfg.key(),
    )?;
    assert_eq!(finalized.security_mode(), SecurityMode::CapKey);
    finalized.execute()?.check()?;
    assert!(target.contains(&ObjId::partition(0x10000)));
    dev.fini();
    Ok(())
}

#[test]
fn test_invalid_config_rejected() -> Result<()> {
    let yaml = r#"
device:
  DefaultTimeout: 5
  Retries: 0
security:
  Capability: "0101"
"#;
    let mut cfg: Config = serde_yaml::from_str(yaml)?;
    assert!(cfg.validate_and_normalize().is_err());

    let yaml = format!(
        "device:\n  DefaultTimeout: 5\n  Retries: 0\nsecurity:\n  Capability: \"{}\"\n",
        "00".repeat(80)
    );
    let mut cfg: Config = serde_yaml::from_str(&yaml)?;
    cfg.validate_and_normalize()?;
    assert_eq!(cfg.key(), None);
    assert_eq!(cfg.device.max_attr_segment_bytes, 64 * 1024);
    assert!(cfg.request.options.is_empty());
    Ok(())
}

#[test]
#[serial]
fn test_logger_installs_once() -> Result<()> {
    let path = resolve_config_path("tests/config_logger.yaml")?;
    let path = path.to_str().context("non UTF-8 path")?;
    let _guard = init_logger(path)?;
    tracing::info!(obj = %ObjId::new(1, 100), "logger ready");
    assert!(init_logger(path).is_err());
    Ok(())
}
