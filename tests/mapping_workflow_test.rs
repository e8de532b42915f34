//! Mapping workflow: concurrency, activation, disabling, copy and preview.

mod common;

use analyzer_core::config::PreviewConfig;
use analyzer_core::error::IntegrationError;
use analyzer_core::mapping::{
    is_compatible, CopyOptions, MappingCopier, MappingPreviewService, QualitativeMappingRequest,
    QualitativeMappingService, UnitMappingRequest, UnitMappingService,
};
use analyzer_core::model::{
    AnalyzerStatus, ConcurrencyToken, DomainKind, ErrorSeverity, ErrorType, FieldKind,
    MappingRequest, MappingType, MappingUpdate,
};
use common::Harness;
use rust_decimal::Decimal;
use std::str::FromStr;

#[tokio::test]
async fn test_stale_token_is_rejected() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let glu = h.field("a-1", "GLU", FieldKind::Numeric).await;
    let draft = h
        .mappings
        .create_mapping(MappingRequest::new(
            &glu.id,
            "test-glucose",
            DomainKind::Test,
            MappingType::TestLevel,
        ))
        .await
        .unwrap();
    assert!(!draft.active);
    let seen = ConcurrencyToken::from(&draft);

    // Someone else edits the mapping first.
    let mut update = MappingUpdate::from_mapping(&draft);
    update.domain_kind = DomainKind::Result;
    update.mapping_type = MappingType::ResultLevel;
    let edited = h.mappings.update_mapping(update, false).await.unwrap();
    assert_eq!(edited.version, draft.version + 1);

    let err = h
        .mappings
        .activate_mapping(&draft.id, false, Some(seen))
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::ConcurrencyConflict { .. }));
    assert_eq!(
        err.to_string(),
        "Mapping was modified by another user. Please refresh and try again."
    );

    let stored = h.mappings.get_mapping(&draft.id).await.unwrap();
    assert!(!stored.active);
    assert_eq!(stored.domain_kind, DomainKind::Result);

    let stale_timestamp = ConcurrencyToken::UpdatedAt(draft.last_updated);
    let err = h
        .mappings
        .update_mapping(
            MappingUpdate {
                expected: Some(stale_timestamp),
                ..MappingUpdate::from_mapping(&stored)
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn test_bulk_activation_is_all_or_nothing() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    h.analyzer("a-2", AnalyzerStatus::Setup).await;
    let glu = h.field("a-1", "GLU", FieldKind::Numeric).await;
    let na = h.field("a-1", "NA", FieldKind::Numeric).await;
    let other = h.field("a-2", "K", FieldKind::Numeric).await;

    let mut ids = Vec::new();
    for (field, domain) in [(&glu, "test-glucose"), (&na, "test-sodium")] {
        let m = h
            .mappings
            .create_mapping(MappingRequest::new(
                &field.id,
                domain,
                DomainKind::Test,
                MappingType::TestLevel,
            ))
            .await
            .unwrap();
        ids.push(m.id);
    }
    let foreign = h
        .mappings
        .create_mapping(MappingRequest::new(
            &other.id,
            "test-potassium",
            DomainKind::Test,
            MappingType::TestLevel,
        ))
        .await
        .unwrap();

    let mut with_foreign = ids.clone();
    with_foreign.push(foreign.id.clone());
    let err = h
        .mappings
        .bulk_activate_mappings("a-1", &with_foreign, false)
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Validation(_)));

    let mut with_missing = ids.clone();
    with_missing.push("no-such-mapping".to_string());
    let err = h
        .mappings
        .bulk_activate_mappings("a-1", &with_missing, false)
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::NotFound { .. }));

    for id in &ids {
        assert!(!h.mappings.get_mapping(id).await.unwrap().active);
    }

    let activated = h
        .mappings
        .bulk_activate_mappings("a-1", &ids, false)
        .await
        .unwrap();
    assert_eq!(activated.len(), 2);
    assert!(activated.iter().all(|m| m.active && m.version == 1));
}

#[tokio::test]
async fn test_active_analyzer_needs_confirmation() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    h.configure_chemistry("a-1").await;
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Active);

    let k = h.field("a-1", "K", FieldKind::Numeric).await;
    let draft = h
        .mappings
        .create_mapping(MappingRequest::new(
            &k.id,
            "result-potassium",
            DomainKind::Result,
            MappingType::ResultLevel,
        ))
        .await
        .unwrap();
    // Creating on a live analyzer only ever yields a draft.
    assert!(!draft.active);
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Active);

    let err = h
        .mappings
        .activate_mapping(&draft.id, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::ConfirmationRequired(_)));

    let active = h
        .mappings
        .activate_mapping(&draft.id, true, Some(ConcurrencyToken::from(&draft)))
        .await
        .unwrap();
    assert!(active.active);

    let err = h
        .mappings
        .disable_mapping(&active.id, false, "retire potassium")
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::ConfirmationRequired(_)));
    assert!(h.mappings.get_mapping(&active.id).await.unwrap().active);

    let disabled = h
        .mappings
        .disable_mapping(&active.id, true, "retire potassium")
        .await
        .unwrap();
    assert!(!disabled.active);
}

#[tokio::test]
async fn test_draft_disable_needs_no_confirmation() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    h.configure_chemistry("a-1").await;

    let k = h.field("a-1", "K", FieldKind::Numeric).await;
    let draft = h
        .mappings
        .create_mapping(MappingRequest::new(
            &k.id,
            "result-potassium",
            DomainKind::Result,
            MappingType::ResultLevel,
        ))
        .await
        .unwrap();
    let disabled = h
        .mappings
        .disable_mapping(&draft.id, false, "never used")
        .await
        .unwrap();
    assert!(!disabled.active);
}

#[tokio::test]
async fn test_disable_rules() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let created = h.configure_chemistry("a-1").await;
    let required = created.iter().find(|m| m.required).unwrap();
    let optional = created.iter().find(|m| !m.required).unwrap();

    let err = h
        .mappings
        .disable_mapping(&required.id, true, "cleanup")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot disable required mapping"));

    let record = h
        .errors
        .create_error("a-1", ErrorType::Mapping, ErrorSeverity::Error, "unmapped", None)
        .await
        .unwrap();
    // ERROR_PENDING: no confirmation needed, but the pending error blocks.
    let err = h
        .mappings
        .disable_mapping(&optional.id, false, "cleanup")
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("1 pending messages reference this mapping"));

    h.errors.acknowledge_error(&record.id, "tech-1").await.unwrap();
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Active);
    let disabled = h
        .mappings
        .disable_mapping(&optional.id, true, "cleanup")
        .await
        .unwrap();
    assert!(!disabled.active);

    let live = h.mappings.get_mappings_for_analyzer("a-1", false).await.unwrap();
    assert_eq!(live.len(), 3);
    assert!(live.iter().all(|v| v.field.is_some()));
    let all = h.mappings.get_mappings_for_analyzer("a-1", true).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_incompatible_pairings_rejected() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let hiv = h.field("a-1", "HIV", FieldKind::Qualitative).await;
    let comment = h.field("a-1", "COMMENT", FieldKind::Text).await;

    let err = h
        .mappings
        .create_mapping(MappingRequest::new(
            &hiv.id,
            "test-hiv",
            DomainKind::Test,
            MappingType::TestLevel,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation error: QUALITATIVE analyzer field can only map to RESULT domain fields. Attempted: TEST"
    );

    assert!(h
        .mappings
        .create_mapping(MappingRequest::new(
            &comment.id,
            "result-x",
            DomainKind::Result,
            MappingType::ResultLevel,
        ))
        .await
        .is_err());

    // Rejections leave the analyzer where it was.
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Setup);

    assert!(is_compatible(FieldKind::Numeric, DomainKind::Test));
    assert!(is_compatible(FieldKind::Text, DomainKind::Sample));
    assert!(is_compatible(FieldKind::Custom, DomainKind::Qc));
}

#[tokio::test]
async fn test_activation_checks_are_distinct() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let glu = h.field("a-1", "GLU", FieldKind::Numeric).await;

    let err = h.mappings.validate_required_mappings("a-1").await.unwrap_err();
    assert!(err.to_string().contains("isRequired=true"));

    h.map_active(
        MappingRequest::new(&glu.id, "test-glucose", DomainKind::Test, MappingType::TestLevel)
            .required(),
    )
    .await;

    // One required mapping satisfies the weak check but not the role check.
    h.mappings.validate_required_mappings("a-1").await.unwrap();
    let validation = h.mappings.validate_activation("a-1").await.unwrap();
    assert!(!validation.can_activate);
    assert_eq!(
        validation.missing_required,
        vec!["Sample ID".to_string(), "Result Value".to_string()]
    );
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Validation);

    let metrics = h.mappings.mapping_metrics("a-1").await.unwrap();
    assert_eq!(metrics.total_fields, 1);
    assert_eq!(metrics.mapped_fields, 1);
}

#[tokio::test]
async fn test_copy_between_analyzers() {
    let h = Harness::new();
    h.analyzer("src", AnalyzerStatus::Setup).await;
    h.analyzer("dst", AnalyzerStatus::Setup).await;
    h.configure_chemistry("src").await;

    h.field("dst", "GLU", FieldKind::Numeric).await;
    h.field("dst", "NA", FieldKind::Numeric).await;
    // Same name, incompatible kind for a SAMPLE mapping.
    h.field("dst", "SAMPLE_ID", FieldKind::Numeric).await;

    let copier = MappingCopier::new(h.mappings.clone(), h.repos.clone());

    // Without skip_incompatible the incompatible pairing fails the copy.
    h.analyzer("strict", AnalyzerStatus::Setup).await;
    h.field("strict", "SAMPLE_ID", FieldKind::Numeric).await;
    let err = copier
        .copy_mappings("src", "strict", CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Validation(_)));

    let report = copier
        .copy_mappings(
            "src",
            "dst",
            CopyOptions {
                skip_incompatible: true,
                ..CopyOptions::default()
            },
        )
        .await
        .unwrap();
    // GLU and NA copy; SAMPLE_ID is incompatible; LOT123 has no target field.
    assert_eq!(report.copied_count, 2);
    assert_eq!(report.skipped_count, 2);
    assert_eq!(report.copied_mapping_ids.len(), 2);

    for id in &report.copied_mapping_ids {
        let copied = h.mappings.get_mapping(id).await.unwrap();
        assert_eq!(copied.analyzer_id, "dst");
        assert!(!copied.active, "copies start as drafts");
    }

    // Copying again skips the now-mapped fields unless overwriting.
    let again = copier
        .copy_mappings(
            "src",
            "dst",
            CopyOptions {
                skip_incompatible: true,
                overwrite_existing: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(again.copied_count, 0);

    let overwrite = copier
        .copy_mappings(
            "src",
            "dst",
            CopyOptions {
                skip_incompatible: true,
                overwrite_existing: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(overwrite.copied_count, 2);

    let err = copier
        .copy_mappings("src", "src", CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Validation(_)));
    assert!(copier
        .copy_mappings("src", "missing", CopyOptions::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_preview_applies_active_mappings() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let sample = h.field("a-1", "O_2", FieldKind::Text).await;
    let value = h.field("a-1", "R_3", FieldKind::Numeric).await;

    for request in [
        MappingRequest::new(&sample.id, "sample-accession", DomainKind::Sample, MappingType::Metadata)
            .required(),
        MappingRequest::new(&value.id, "result-glucose", DomainKind::Result, MappingType::ResultLevel)
            .required(),
    ] {
        h.map_active(request).await;
    }

    let service = MappingPreviewService::new(h.repos.clone(), PreviewConfig::default());
    let preview = service
        .preview_mapping("a-1", "H|\\^&|||ACME\rO|1|S-1\rR|1|^^^GLU|98|mg/dL")
        .await
        .unwrap();

    assert_eq!(preview.applied_mappings.len(), 2);
    assert_eq!(preview.entities.sample_id.as_deref(), Some("S-1"));
    assert_eq!(
        preview.entities.results,
        vec![("result-glucose".to_string(), "98".to_string())]
    );
    assert!(preview
        .warnings
        .contains(&"Field 'R_4' is not mapped to any domain field".to_string()));
    assert!(preview
        .warnings
        .contains(&"Required mapping missing: Test Code".to_string()));

    // Preview never writes.
    assert_eq!(h.mappings.get_mappings_for_analyzer("a-1", true).await.unwrap().len(), 2);

    let err = service.preview_mapping("a-1", "   ").await.unwrap_err();
    assert_eq!(err.to_string(), "Validation error: Sample message is required");
    let err = service.preview_mapping("missing", "H|x").await.unwrap_err();
    assert!(matches!(err, IntegrationError::NotFound { .. }));

    let tiny = MappingPreviewService::new(
        h.repos.clone(),
        PreviewConfig {
            max_message_bytes: 4,
        },
    );
    assert!(tiny.preview_mapping("a-1", "H|\\^&|||ACME").await.is_err());
}

#[tokio::test]
async fn test_unit_and_value_mappings() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    let glu = h.field("a-1", "GLU", FieldKind::Numeric).await;
    let hiv = h.field("a-1", "HIV", FieldKind::Qualitative).await;

    let units = UnitMappingService::new(h.repos.unit_mappings.clone(), h.repos.fields.clone());
    let err = units
        .create_unit_mapping(UnitMappingRequest {
            analyzer_field_id: glu.id.clone(),
            analyzer_unit: "mg/dL".into(),
            domain_unit: "mmol/L".into(),
            conversion_factor: None,
            reject_if_mismatch: false,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Conversion factor is required"));

    units
        .create_unit_mapping(UnitMappingRequest {
            analyzer_field_id: glu.id.clone(),
            analyzer_unit: "mg/dL".into(),
            domain_unit: "mmol/L".into(),
            conversion_factor: Some(Decimal::from_str("0.0555").unwrap()),
            reject_if_mismatch: false,
        })
        .await
        .unwrap();
    assert_eq!(units.get_unit_mappings(&glu.id).await.unwrap().len(), 1);

    let values =
        QualitativeMappingService::new(h.repos.qualitative_mappings.clone(), h.repos.fields.clone());
    values
        .create(QualitativeMappingRequest {
            analyzer_field_id: hiv.id.clone(),
            analyzer_value: "POS".into(),
            domain_code: "260373001".into(),
            is_default: false,
        })
        .await
        .unwrap();
    values
        .create(QualitativeMappingRequest {
            analyzer_field_id: hiv.id.clone(),
            analyzer_value: "NEG".into(),
            domain_code: "260415000".into(),
            is_default: true,
        })
        .await
        .unwrap();
    assert!(values
        .create(QualitativeMappingRequest {
            analyzer_field_id: hiv.id.clone(),
            analyzer_value: "pos".into(),
            domain_code: "x".into(),
            is_default: false,
        })
        .await
        .is_err());

    assert_eq!(
        values.translate(&hiv.id, "pos").await.unwrap().as_deref(),
        Some("260373001")
    );
    assert_eq!(
        values.translate(&hiv.id, "???").await.unwrap().as_deref(),
        Some("260415000")
    );
}
