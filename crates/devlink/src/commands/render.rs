//! `devlink render` -- show the device a manifest declares.

use devlink_core::DynamicObject;
use devlink_core::template;

use crate::cli::{GlobalOpts, RenderArgs};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &RenderArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut link = super::load_manifest(&args.manifest)?;
    if !link.status.model.is_resolved() {
        link.status.model = link.spec.model.clone();
    }

    let device = template::construct_device(&link).map_err(|e| CliError::Template {
        reason: e.to_string(),
    })?;
    tracing::debug!(device = %device.key(), kind = device.kind(), "rendered device");

    let out = output::render_single(&global.output, &device, detail)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn join_map(map: &std::collections::BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn detail(device: &DynamicObject) -> String {
    let spec = device
        .spec()
        .and_then(|s| serde_json::to_string_pretty(s).ok())
        .unwrap_or_default();
    output::render_fields(&[
        ("Kind", device.kind().to_owned()),
        ("API Version", device.api_version().to_owned()),
        ("Name", device.name().to_owned()),
        ("Namespace", device.namespace().to_owned()),
        ("Labels", join_map(&device.labels())),
        ("Annotations", join_map(&device.annotations())),
        ("Spec", spec),
    ])
}
