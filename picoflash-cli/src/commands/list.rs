//! Device listing.

use console::style;
use picoflash::{DetectedDevice, detect_devices};

/// JSON representation of a device list.
pub(crate) fn devices_json(devices: &[DetectedDevice]) -> serde_json::Value {
    devices
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id.to_string(),
                "bus": d.id.bus,
                "address": d.id.address,
                "vid": d.vid,
                "pid": d.pid,
                "product": d.product,
                "serial": d.serial,
            })
        })
        .collect()
}

/// List devices in BOOTSEL mode.
pub(crate) fn cmd_list_devices(json: bool) {
    let detected = detect_devices();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&devices_json(&detected)).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Devices in BOOTSEL mode:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("(none found)").dim());
        return;
    }

    for device in &detected {
        let product = device.product.as_deref().unwrap_or("");
        let serial = device
            .serial
            .as_deref()
            .map(|s| format!(" serial {s}"))
            .unwrap_or_default();
        eprintln!(
            "  {} {} ({:04X}:{:04X}){}{}",
            style("•").green(),
            style(device.id).cyan(),
            device.vid,
            device.pid,
            if product.is_empty() {
                String::new()
            } else {
                format!(" - {}", style(product).dim())
            },
            serial
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picoflash::DeviceId;

    #[test]
    fn test_devices_json_shape() {
        let devices = vec![DetectedDevice {
            id: DeviceId { bus: 1, address: 7 },
            vid: 0x2E8A,
            pid: 0x0003,
            product: Some("RP2 Boot".to_string()),
            serial: None,
        }];

        let value = devices_json(&devices);
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["id"], "001:007");
        assert_eq!(array[0]["vid"], 0x2E8A);
        assert_eq!(array[0]["product"], "RP2 Boot");
        assert!(array[0]["serial"].is_null());
    }

    #[test]
    fn test_devices_json_empty_is_array() {
        assert_eq!(devices_json(&[]), serde_json::json!([]));
    }
}
