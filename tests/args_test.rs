// File: tests/args_test.rs

use calico_wrapper::args::{CniArgs, IP, K8S_POD_NAME, K8S_POD_NAMESPACE};
use calico_wrapper::WrapperError;

#[test]
fn test_round_trip_of_runtime_args() -> Result<(), Box<dyn std::error::Error>> {
    let samples = [
        "IgnoreUnknown=1;K8S_POD_NAMESPACE=default;K8S_POD_NAME=busybox;K8S_POD_INFRA_CONTAINER_ID=d5caf172783d5a641e5dca1635c9c91e47c75d05c31de54faf38756ef1fea637",
        "K8S_POD_NAME=web-0",
        "A=;B==;C=x=y",
        "",
    ];

    for sample in samples {
        let args = CniArgs::parse(sample)?;
        assert_eq!(args.serialize(), sample);
    }

    Ok(())
}

#[test]
fn test_empty_args() -> Result<(), Box<dyn std::error::Error>> {
    let args = CniArgs::parse("")?;
    assert!(args.is_empty());
    assert_eq!(CniArgs::new().serialize(), "");

    Ok(())
}

#[test]
fn test_address_is_appended() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = CniArgs::parse("IgnoreUnknown=1;K8S_POD_NAMESPACE=default;K8S_POD_NAME=busybox")?;
    args.insert(IP, "10.0.0.5");

    let encoded = args.serialize();
    assert!(encoded.ends_with(";IP=10.0.0.5"));

    // Still valid under the same encoding
    let reparsed = CniArgs::parse(&encoded)?;
    assert_eq!(reparsed, args);
    assert_eq!(reparsed.get(K8S_POD_NAMESPACE), Some("default"));
    assert_eq!(reparsed.get(K8S_POD_NAME), Some("busybox"));

    Ok(())
}

#[test]
fn test_malformed_segment() {
    let err = CniArgs::parse("K8S_POD_NAMESPACE=default;busybox").unwrap_err();
    assert!(matches!(err, WrapperError::ArgsParse { ref segment } if segment == "busybox"));
    assert!(err.to_string().contains("busybox"));
}
