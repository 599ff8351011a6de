//! NetFlow v9 specific behavior: timestamp rewriting to IPFIX absolute
//! milliseconds at template-parse and record-decode time, and the
//! unknown-scope-code Options Template drop rule.

use flowsink_core::convert;
use flowsink_core::element::Element;
use flowsink_core::ingest::{self, RawSet};
use flowsink_core::variable_versions::data_number::FieldValue as WireFieldValue;

fn nfv9_header(unix_secs: u32, sys_up_time_ms: u32) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&9u16.to_be_bytes()); // version
    h.extend_from_slice(&0u16.to_be_bytes()); // count
    h.extend_from_slice(&sys_up_time_ms.to_be_bytes());
    h.extend_from_slice(&unix_secs.to_be_bytes());
    h.extend_from_slice(&1u32.to_be_bytes()); // sequence
    h.extend_from_slice(&3u32.to_be_bytes()); // source id
    h
}

#[test]
fn first_switched_field_is_retagged_onto_flow_start_milliseconds() {
    let mut body = Vec::new();
    body.extend_from_slice(&256u16.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&22u16.to_be_bytes()); // FIRST_SWITCHED
    body.extend_from_slice(&4u16.to_be_bytes());

    let sets = ingest::parse_sets(&body_with_set_header(0, &body), 9).unwrap();
    let RawSet::Template(template) = &sets[0] else {
        panic!("expected a template");
    };
    assert_eq!(template.fields[0].element, Element::new(0, 152));
}

#[test]
fn a_decoded_record_gets_its_relative_timestamp_made_absolute() {
    let header_bytes = nfv9_header(1_562_857_357, 10_001);
    let (header, _rest) = ingest::parse_header(&header_bytes).unwrap();

    let fields = vec![flowsink_core::template::TemplateFieldDef {
        element: Element::new(0, 152), // already retagged, as a template parse would leave it
        length: 4,
        variable_length: false,
        last_identical: true,
    }];
    let mut values = vec![WireFieldValue::Duration(std::time::Duration::from_millis(5_000))];

    convert::convert_v9_record_timestamps(
        &fields,
        &mut values,
        header.export_time_secs,
        header.sys_up_time_ms,
    );

    let WireFieldValue::Duration(abs) = &values[0] else {
        panic!("expected a duration value");
    };
    assert_eq!(abs.as_millis() as i64, 1_562_857_357 * 1000 - 10_001 + 5_000);
}

#[test]
fn options_template_with_an_unrecognized_scope_code_is_dropped_entirely() {
    let mut body = Vec::new();
    body.extend_from_slice(&512u16.to_be_bytes()); // template id
    body.extend_from_slice(&4u16.to_be_bytes()); // scope len bytes
    body.extend_from_slice(&0u16.to_be_bytes()); // option len bytes
    body.extend_from_slice(&42u16.to_be_bytes()); // unrecognized scope type
    body.extend_from_slice(&4u16.to_be_bytes()); // scope length

    let mut msg_body = Vec::new();
    msg_body.extend_from_slice(&1u16.to_be_bytes()); // NFv9 options template set id
    msg_body.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    msg_body.extend_from_slice(&body);

    let sets = ingest::parse_sets(&msg_body, 9).unwrap();
    assert!(sets.is_empty());
}

fn body_with_set_header(_unused: u32, template_record: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes()); // NFv9 template set id
    body.extend_from_slice(&((template_record.len() + 4) as u16).to_be_bytes());
    body.extend_from_slice(template_record);
    body
}
