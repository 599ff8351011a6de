//! Cross-module coverage of template learning feeding a record parser,
//! including alias resolution and biflow auto-ignore end to end.

use flowsink_core::config::{Column, ColumnSource};
use flowsink_core::element::Element;
use flowsink_core::record::RecordParser;
use flowsink_core::session::Protocol;
use flowsink_core::template::{TemplateFieldDef, TemplateStore};
use flowsink_core::template_events::TemplateProtocol;
use flowsink_core::types::{DataType, TargetValue};
use flowsink_core::variable_versions::data_number::{DataNumber, FieldValue};
use std::time::Instant;

fn field(enterprise: u32, id: u16) -> TemplateFieldDef {
    TemplateFieldDef {
        element: Element::new(enterprise, id),
        length: 4,
        variable_length: false,
        last_identical: true,
    }
}

#[test]
fn alias_column_resolves_to_whichever_candidate_the_template_carries() {
    let mut store = TemplateStore::new(Protocol::Tcp, TemplateProtocol::Ipfix);
    store.observe_time(Instant::now(), 0);
    // A vendor-specific egress-interface element (enterprise 9) stands in
    // for the IANA one here; the alias should still resolve it.
    store
        .upsert_template(256, vec![field(9, 14), field(0, 8)], 0)
        .unwrap();
    let template = store.lookup(256).unwrap().definition.clone();

    let columns = vec![Column {
        name: "egress_if".to_string(),
        target_name: None,
        source: ColumnSource::Alias(vec![(0, 14), (9, 14)]),
        target_type: DataType::UInt32,
        nullable: false,
        reverse: false,
    }];
    let parser = RecordParser::build(&columns, &template, 1, false, false).unwrap();
    let values = vec![
        FieldValue::DataNumber(DataNumber::U32(4)),
        FieldValue::DataNumber(DataNumber::U32(0xC000_0201)),
    ];
    let parsed = parser.parse_record(&columns, &values, 0).unwrap();
    assert_eq!(parsed.values[0], TargetValue::U32(4));
}

#[test]
fn redefinition_over_tcp_is_rejected_but_udp_accepts_and_rebuilds() {
    let mut tcp_store = TemplateStore::new(Protocol::Tcp, TemplateProtocol::Ipfix);
    tcp_store.observe_time(Instant::now(), 0);
    tcp_store.upsert_template(300, vec![field(0, 8)], 0).unwrap();
    assert!(tcp_store.upsert_template(300, vec![field(0, 12)], 0).is_err());

    let mut udp_store = TemplateStore::new(Protocol::Udp, TemplateProtocol::V9);
    udp_store.observe_time(Instant::now(), 0);
    udp_store.upsert_template(300, vec![field(0, 8)], 0).unwrap();
    let first_version = udp_store.lookup(300).unwrap().version;
    udp_store.upsert_template(300, vec![field(0, 12)], 0).unwrap();
    let second_version = udp_store.lookup(300).unwrap().version;
    assert_ne!(first_version, second_version);
}

#[test]
fn biflow_counters_all_zero_in_one_direction_are_suppressed() {
    let mut store = TemplateStore::new(Protocol::Tcp, TemplateProtocol::Ipfix);
    store.observe_time(Instant::now(), 0);
    store
        .upsert_template(
            400,
            vec![field(0, 1), field(0, 2), field(29305, 1), field(29305, 2)],
            0,
        )
        .unwrap();
    let template = store.lookup(400).unwrap().definition.clone();

    let columns = vec![
        Column {
            name: "octets".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 1 },
            target_type: DataType::UInt64,
            nullable: false,
            reverse: false,
        },
        Column {
            name: "rev_octets".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 1 },
            target_type: DataType::UInt64,
            nullable: true,
            reverse: true,
        },
    ];
    let parser = RecordParser::build(&columns, &template, 1, true, false).unwrap();
    let values = vec![
        FieldValue::DataNumber(DataNumber::U32(1000)),
        FieldValue::DataNumber(DataNumber::U32(10)),
        FieldValue::DataNumber(DataNumber::U32(0)),
        FieldValue::DataNumber(DataNumber::U32(0)),
    ];
    let parsed = parser.parse_record(&columns, &values, 0).unwrap();
    assert_eq!(parsed.values[0], TargetValue::U64(1000));
    assert_eq!(parsed.values[1], TargetValue::Null);
}

#[test]
fn split_biflow_emits_a_forward_only_row_and_a_reverse_only_row() {
    let mut store = TemplateStore::new(Protocol::Tcp, TemplateProtocol::Ipfix);
    store.observe_time(Instant::now(), 0);
    store
        .upsert_template(
            401,
            vec![field(0, 1), field(0, 2), field(29305, 1), field(29305, 2)],
            0,
        )
        .unwrap();
    let template = store.lookup(401).unwrap().definition.clone();

    let columns = vec![
        Column {
            name: "octets".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 1 },
            target_type: DataType::UInt64,
            nullable: true,
            reverse: false,
        },
        Column {
            name: "rev_octets".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 1 },
            target_type: DataType::UInt64,
            nullable: true,
            reverse: true,
        },
    ];
    // split_biflow=true, biflow_autoignore=false: both directions carry
    // real (non-zero) counters, so neither row should be autoignore-nulled
    // beyond the forced cross-direction projection.
    let parser = RecordParser::build(&columns, &template, 1, false, true).unwrap();
    let values = vec![
        FieldValue::DataNumber(DataNumber::U32(1000)),
        FieldValue::DataNumber(DataNumber::U32(10)),
        FieldValue::DataNumber(DataNumber::U32(2000)),
        FieldValue::DataNumber(DataNumber::U32(20)),
    ];
    let rows = parser.parse_record_rows(&columns, &values, 0).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values[0], TargetValue::U64(1000));
    assert_eq!(rows[0].values[1], TargetValue::Null);
    assert_eq!(rows[1].values[0], TargetValue::Null);
    assert_eq!(rows[1].values[1], TargetValue::U64(2000));
}
