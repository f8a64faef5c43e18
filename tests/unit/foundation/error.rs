use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SkyloopError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        SkyloopError::acquisition("x")
            .to_string()
            .contains("acquisition error:")
    );
    assert!(SkyloopError::decode("x").to_string().contains("decode error:"));
    assert!(
        SkyloopError::encoding("x")
            .to_string()
            .contains("encoding error:")
    );
    assert!(
        SkyloopError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn shortfall_reports_counts() {
    let msg = SkyloopError::SynchronizationShortfall {
        entries: 1,
        required: 2,
    }
    .to_string();
    assert!(msg.contains("built 1"));
    assert!(msg.contains("at least 2"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SkyloopError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert!(!err.is_cancelled());
    assert!(SkyloopError::Cancelled.is_cancelled());
}

#[test]
fn serde_json_errors_convert() {
    let err: SkyloopError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, SkyloopError::Serde(_)));
}
