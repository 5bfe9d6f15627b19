// ── Template rendering ──
//
// Pure transforms from a DeviceLink's template to the device it declares.
// `construct_device` builds a fresh device, `update_device` merges the
// template into an existing one and reports whether anything the template
// controls actually changed.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::TemplateError;
use crate::model::{DeviceAdaptor, DeviceLink, DeviceTemplate, DynamicObject};

pub const ANNOTATION_ADAPTOR_NODE: &str = "edge.cattle.io/adaptor-node";
pub const ANNOTATION_ADAPTOR_NAME: &str = "edge.cattle.io/adaptor-name";
pub const ANNOTATION_ADAPTOR_PARAMETERS: &str = "edge.cattle.io/adaptor-parameters";

/// Decode the template's spec payload into a mapping.
///
/// An absent payload or an explicit `null` renders as an empty mapping;
/// anything that is not a mapping is rejected.
pub fn decode_spec(template: &DeviceTemplate) -> Result<Map<String, Value>, TemplateError> {
    let Some(raw) = template.spec.as_ref() else {
        return Ok(Map::new());
    };
    match raw.decode::<Value>()? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Bool(_) => Err(TemplateError::NotAMapping { found: "a boolean" }),
        Value::Number(_) => Err(TemplateError::NotAMapping { found: "a number" }),
        Value::String(_) => Err(TemplateError::NotAMapping { found: "a string" }),
        Value::Array(_) => Err(TemplateError::NotAMapping { found: "a sequence" }),
    }
}

/// Stamp the adaptor identity onto an annotation map.
///
/// The parameters snapshot is only written when parameters are declared; it
/// holds the raw bytes verbatim, so they must be UTF-8 to fit an annotation.
pub fn mark_device(
    adaptor: &DeviceAdaptor,
    mut annotations: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, TemplateError> {
    annotations.insert(ANNOTATION_ADAPTOR_NODE.to_owned(), adaptor.node.clone());
    annotations.insert(ANNOTATION_ADAPTOR_NAME.to_owned(), adaptor.name.clone());
    if let Some(parameters) = adaptor.parameters.as_ref() {
        annotations.insert(
            ANNOTATION_ADAPTOR_PARAMETERS.to_owned(),
            parameters.as_str()?.to_owned(),
        );
    }
    Ok(annotations)
}

/// Build the device a link declares, typed by the link's resolved model.
pub fn construct_device(link: &DeviceLink) -> Result<DynamicObject, TemplateError> {
    let model = &link.status.model;
    if !model.is_resolved() {
        return Err(TemplateError::MissingModel);
    }
    let template = &link.spec.template;
    let spec = decode_spec(template)?;

    let mut device = DynamicObject::new(model, &link.key());
    device.set_labels(&template.labels);
    device.set_annotations(&mark_device(
        &link.spec.adaptor,
        template.annotations.clone(),
    )?);
    device.set_spec(spec);
    device.set_owner_references(&[link.controller_reference()]);
    Ok(device)
}

/// Merge the link's template into an existing device.
///
/// Labels and annotations are layered over the existing maps, so keys the
/// template does not mention survive. The spec is replaced wholesale.
/// Returns whether any template-controlled field changed; on error the
/// device is left untouched.
pub fn update_device(link: &DeviceLink, target: &mut DynamicObject) -> Result<bool, TemplateError> {
    let template = &link.spec.template;
    let spec = decode_spec(template)?;
    let original = target.clone();

    let mut labels = target.labels();
    labels.extend(template.labels.clone());

    let mut annotations = target.annotations();
    annotations.extend(template.annotations.clone());
    let annotations = mark_device(&link.spec.adaptor, annotations)?;

    target.set_labels(&labels);
    target.set_annotations(&annotations);
    target.set_spec(spec);

    Ok(!target.rendered_eq(&original))
}

/// Whether the declared adaptor parameters differ from the last evaluated
/// ones.
///
/// Only a byte difference between two present payloads counts. A payload
/// appearing or disappearing is not reported here.
pub fn adaptor_parameters_changed(declared: &DeviceAdaptor, observed: &DeviceAdaptor) -> bool {
    match (declared.parameters.as_ref(), observed.parameters.as_ref()) {
        (Some(declared), Some(observed)) => declared.as_bytes() != observed.as_bytes(),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::model::{DeviceLinkSpec, ObjectKey, RawExtension, TypeMeta};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn link_with_spec(spec: Option<RawExtension>) -> DeviceLink {
        let mut link = DeviceLink::new(
            &ObjectKey::new("default", "fan"),
            DeviceLinkSpec {
                adaptor: DeviceAdaptor {
                    node: "edge-1".into(),
                    name: "adaptors.edge.cattle.io/dummy".into(),
                    parameters: Some(RawExtension::from_bytes(&b"a=1"[..])),
                },
                model: TypeMeta::new("devices.edge.cattle.io/v1alpha1", "DummyDevice"),
                template: DeviceTemplate {
                    labels: BTreeMap::from([("d".to_owned(), "1".to_owned())]),
                    annotations: BTreeMap::from([("note".to_owned(), "fan".to_owned())]),
                    spec,
                },
            },
        );
        link.metadata.uid = "uid-1".into();
        link.status.model = link.spec.model.clone();
        link
    }

    fn spec_payload(value: &Value) -> Option<RawExtension> {
        Some(RawExtension::from_value(value))
    }

    #[test]
    fn construct_renders_labels_annotations_and_spec() {
        let link = link_with_spec(spec_payload(&json!({"p": 10})));
        let device = construct_device(&link).unwrap();

        assert_eq!(device.kind(), "DummyDevice");
        assert_eq!(device.key(), link.key());
        assert_eq!(device.labels(), link.spec.template.labels);
        assert_eq!(device.get_path(&["spec", "p"]), Some(&json!(10)));

        let annotations = device.annotations();
        assert_eq!(annotations["note"], "fan");
        assert_eq!(annotations[ANNOTATION_ADAPTOR_NODE], "edge-1");
        assert_eq!(annotations[ANNOTATION_ADAPTOR_NAME], "adaptors.edge.cattle.io/dummy");
        assert_eq!(annotations[ANNOTATION_ADAPTOR_PARAMETERS], "a=1");
        assert_eq!(device.controller_uid().as_deref(), Some("uid-1"));
    }

    #[test]
    fn parameters_annotation_omitted_without_parameters() {
        let mut link = link_with_spec(None);
        link.spec.adaptor.parameters = None;
        let device = construct_device(&link).unwrap();
        assert!(!device.annotations().contains_key(ANNOTATION_ADAPTOR_PARAMETERS));
        assert_eq!(device.spec(), Some(&Map::new()));
    }

    #[test]
    fn construct_rejects_malformed_payload() {
        let link = link_with_spec(Some(RawExtension::from_bytes(&b"{\"p\": "[..])));
        assert!(matches!(
            construct_device(&link),
            Err(TemplateError::Decode(_))
        ));
    }

    #[test]
    fn construct_rejects_non_mapping_payload() {
        let link = link_with_spec(spec_payload(&json!([1, 2])));
        assert!(matches!(
            construct_device(&link),
            Err(TemplateError::NotAMapping { found: "a sequence" })
        ));
    }

    #[test]
    fn construct_requires_resolved_model() {
        let mut link = link_with_spec(None);
        link.status.model = TypeMeta::default();
        assert!(matches!(
            construct_device(&link),
            Err(TemplateError::MissingModel)
        ));
    }

    #[test]
    fn non_utf8_parameters_cannot_be_stamped() {
        let mut link = link_with_spec(None);
        link.spec.adaptor.parameters = Some(RawExtension::from_bytes(&b"ip=\xff\xfe"[..]));
        let err = construct_device(&link).unwrap_err();
        assert!(matches!(err, TemplateError::ParametersNotUtf8(_)));
        assert!(err.to_string().starts_with("adaptor parameters are not valid UTF-8"));

        let mut device = construct_device(&link_with_spec(None)).unwrap();
        let before = device.clone();
        assert!(matches!(
            update_device(&link, &mut device),
            Err(TemplateError::ParametersNotUtf8(_))
        ));
        assert_eq!(device, before);
    }

    #[test]
    fn update_is_idempotent_for_unchanged_template() {
        let link = link_with_spec(spec_payload(&json!({"p": 10})));
        let mut device = construct_device(&link).unwrap();
        device.set_resource_version("7");

        assert!(!update_device(&link, &mut device).unwrap());
        assert!(!update_device(&link, &mut device).unwrap());
    }

    #[test]
    fn update_layers_template_over_existing_metadata() {
        let link = link_with_spec(spec_payload(&json!({"p": 10})));
        let mut device = construct_device(&link).unwrap();

        let mut labels = device.labels();
        labels.insert("extra".into(), "kept".into());
        labels.insert("d".into(), "stale".into());
        device.set_labels(&labels);

        assert!(update_device(&link, &mut device).unwrap());
        let labels = device.labels();
        assert_eq!(labels["extra"], "kept");
        assert_eq!(labels["d"], "1");
    }

    #[test]
    fn update_replaces_spec_wholesale() {
        let link = link_with_spec(spec_payload(&json!({"p": 20})));
        let mut device = construct_device(&link_with_spec(spec_payload(&json!({"p": 10, "q": 1}))))
            .unwrap();

        assert!(update_device(&link, &mut device).unwrap());
        assert_eq!(device.spec().unwrap(), json!({"p": 20}).as_object().unwrap());
    }

    #[test]
    fn update_failure_leaves_device_untouched() {
        let good = link_with_spec(spec_payload(&json!({"p": 10})));
        let mut device = construct_device(&good).unwrap();
        let before = device.clone();

        let mut bad = good.clone();
        bad.spec.template.spec = Some(RawExtension::from_bytes(&b"not json"[..]));
        bad.spec.template.labels.insert("new".into(), "label".into());

        assert!(update_device(&bad, &mut device).is_err());
        assert_eq!(device, before);
    }

    #[test]
    fn parameter_comparison_is_byte_exact() {
        let with = |bytes: &[u8]| DeviceAdaptor {
            parameters: Some(RawExtension::from_bytes(bytes)),
            ..DeviceAdaptor::default()
        };
        assert!(!adaptor_parameters_changed(&with(&b"a=1"[..]), &with(&b"a=1"[..])));
        assert!(adaptor_parameters_changed(&with(&b"a=1"[..]), &with(&b"a=2"[..])));
        assert!(adaptor_parameters_changed(
            &with(&br#"{"a":1}"#[..]),
            &with(&br#"{ "a": 1 }"#[..])
        ));
    }

    #[test]
    fn parameter_presence_flip_is_not_a_change() {
        let present = DeviceAdaptor {
            parameters: Some(RawExtension::from_bytes(&b"a=1"[..])),
            ..DeviceAdaptor::default()
        };
        let absent = DeviceAdaptor::default();
        assert!(!adaptor_parameters_changed(&present, &absent));
        assert!(!adaptor_parameters_changed(&absent, &present));
    }
}
