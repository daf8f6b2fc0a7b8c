//! Log-viewer labels for compose services.
//!
//! Every service gets `dev.dozzle.group` (the deployment group) and
//! `dev.dozzle.name` (the service key) so the log viewer can group
//! containers by deployment.

use serde_yaml::{Mapping, Value};

use crate::ConfigResult;

pub const GROUP_LABEL: &str = "dev.dozzle.group";
pub const NAME_LABEL: &str = "dev.dozzle.name";

/// Add labels to every service of a compose document held as a YAML tree.
///
/// Returns the number of services labelled. Documents without a `services`
/// mapping and services that are not mappings are left alone.
pub fn inject_service_labels(manifest: &mut Value, group: &str) -> usize {
    let Some(services) = manifest
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
    else {
        return 0;
    };

    let mut labelled = 0;
    for (key, service) in services.iter_mut() {
        let Some(name) = key.as_str() else {
            continue;
        };
        let Some(service) = service.as_mapping_mut() else {
            continue;
        };

        match service.get_mut("labels") {
            Some(Value::Mapping(labels)) => {
                labels.insert(GROUP_LABEL.into(), group.into());
                labels.insert(NAME_LABEL.into(), name.into());
            }
            Some(Value::Sequence(labels)) => {
                labels.push(format!("{}={}", GROUP_LABEL, group).into());
                labels.push(format!("{}={}", NAME_LABEL, name).into());
            }
            _ => {
                let mut labels = Mapping::new();
                labels.insert(GROUP_LABEL.into(), group.into());
                labels.insert(NAME_LABEL.into(), name.into());
                service.insert("labels".into(), Value::Mapping(labels));
            }
        }
        labelled += 1;
    }
    labelled
}

/// Parse compose YAML, label its services and serialize it back.
pub fn label_manifest(yaml: &str, group: &str) -> ConfigResult<String> {
    let mut manifest: Value = serde_yaml::from_str(yaml)?;
    inject_service_labels(&mut manifest, group);
    Ok(serde_yaml::to_string(&manifest)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_of<'a>(doc: &'a Value, service: &str) -> &'a Value {
        &doc["services"][service]["labels"]
    }

    #[test]
    fn test_mapping_labels_extended() {
        let mut doc: Value = serde_yaml::from_str(
            "services:\n  web:\n    image: nginx\n    labels:\n      team: core\n",
        )
        .unwrap();

        assert_eq!(inject_service_labels(&mut doc, "acme/widgets/main"), 1);
        let labels = labels_of(&doc, "web");
        assert_eq!(labels["team"].as_str(), Some("core"));
        assert_eq!(labels[GROUP_LABEL].as_str(), Some("acme/widgets/main"));
        assert_eq!(labels[NAME_LABEL].as_str(), Some("web"));
    }

    #[test]
    fn test_sequence_labels_appended() {
        let mut doc: Value = serde_yaml::from_str(
            "services:\n  db:\n    image: postgres\n    labels:\n      - team=data\n",
        )
        .unwrap();

        inject_service_labels(&mut doc, "acme/widgets/main");
        let labels: Vec<&str> = labels_of(&doc, "db")
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(
            labels,
            vec![
                "team=data",
                "dev.dozzle.group=acme/widgets/main",
                "dev.dozzle.name=db",
            ]
        );
    }

    #[test]
    fn test_missing_labels_created() {
        let mut doc: Value =
            serde_yaml::from_str("services:\n  worker:\n    image: busybox\n").unwrap();

        inject_service_labels(&mut doc, "g");
        let labels = labels_of(&doc, "worker");
        assert_eq!(labels[GROUP_LABEL].as_str(), Some("g"));
        assert_eq!(labels[NAME_LABEL].as_str(), Some("worker"));
    }

    #[test]
    fn test_documents_without_services_untouched() {
        let mut doc: Value = serde_yaml::from_str("volumes:\n  data: {}\n").unwrap();
        let before = doc.clone();
        assert_eq!(inject_service_labels(&mut doc, "g"), 0);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_non_mapping_service_skipped() {
        let mut doc: Value =
            serde_yaml::from_str("services:\n  odd: ~\n  web:\n    image: nginx\n").unwrap();
        assert_eq!(inject_service_labels(&mut doc, "g"), 1);
        assert!(doc["services"]["odd"].is_null());
    }

    #[test]
    fn test_label_manifest_round_trip_text() {
        let out = label_manifest("services:\n  web:\n    image: nginx\n", "acme/w/main").unwrap();
        assert!(out.contains("dev.dozzle.group: acme/w/main"));
        assert!(out.contains("image: nginx"));
    }
}
