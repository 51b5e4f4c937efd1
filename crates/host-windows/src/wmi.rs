//! Parsers for `wmic` CSV and list output.

use janus_core::mac::normalize;
use janus_core::AdapterType;
use std::collections::BTreeMap;

/// One row of `win32_networkadapter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmiAdapter {
    pub name: String,
    pub description: String,
    pub mac_address: String,
    pub device_id: String,
    pub status: String,
}

fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(|line| line.trim_end_matches('\r'))
}

/// Parses `... get Name,MACAddress,PNPDeviceID,Description,NetEnabled /format:csv`.
/// `None` when no header row carrying the expected columns is present.
pub fn parse_adapter_csv(output: &str) -> Option<Vec<WmiAdapter>> {
    let rows: Vec<&str> = lines(output).collect();
    let header_at = rows.iter().position(|line| {
        line.contains("Description") && line.contains("MACAddress") && line.contains("Name")
    })?;

    let headers: Vec<&str> = rows[header_at].split(',').map(str::trim).collect();
    let column = |name: &str| headers.iter().position(|h| *h == name);
    let name_idx = column("Name")?;
    let mac_idx = column("MACAddress")?;
    let desc_idx = column("Description")?;
    let device_idx = column("PNPDeviceID")?;
    let enabled_idx = column("NetEnabled")?;
    let widest = name_idx
        .max(mac_idx)
        .max(desc_idx)
        .max(device_idx)
        .max(enabled_idx);

    let mut adapters = Vec::new();
    for line in &rows[header_at + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() <= widest {
            continue;
        }
        let mac = parts[mac_idx];
        if mac.len() < 12 {
            continue;
        }
        let description = parts[desc_idx].to_string();
        let name = if parts[name_idx].is_empty() {
            description.clone()
        } else {
            parts[name_idx].to_string()
        };
        adapters.push(WmiAdapter {
            name,
            description,
            mac_address: normalize(mac),
            device_id: parts[device_idx].to_string(),
            status: if parts[enabled_idx].eq_ignore_ascii_case("TRUE") {
                "enabled".to_string()
            } else {
                "disabled".to_string()
            },
        });
    }
    Some(adapters)
}

/// Parses `... get Name,MACAddress,Description /format:list` blocks. The MAC
/// doubles as the device id since this form carries no PNP id.
pub fn parse_adapter_list(output: &str) -> Vec<WmiAdapter> {
    let mut adapters = Vec::new();
    let mut current: BTreeMap<&str, &str> = BTreeMap::new();

    let mut flush = |block: &mut BTreeMap<&str, &str>, out: &mut Vec<WmiAdapter>| {
        if let Some(mac) = block.get("MACAddress").filter(|m| !m.is_empty()) {
            let mac = normalize(mac);
            let description = block.get("Description").copied().unwrap_or_default();
            let name = block
                .get("Name")
                .copied()
                .filter(|n| !n.is_empty())
                .unwrap_or(description);
            out.push(WmiAdapter {
                name: name.to_string(),
                description: description.to_string(),
                device_id: mac.clone(),
                mac_address: mac,
                status: "enabled".to_string(),
            });
        }
        block.clear();
    };

    for line in lines(output) {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut current, &mut adapters);
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            if !value.is_empty() {
                current.insert(key.trim(), value);
            }
        }
    }
    flush(&mut current, &mut adapters);
    adapters
}

/// Generic `wmic <class> get <props> /format:csv` table. The leading `Node`
/// column is dropped, empty cells are omitted and empty rows skipped.
pub fn parse_csv_table(output: &str) -> Vec<BTreeMap<String, String>> {
    let mut rows = lines(output).filter(|line| !line.trim().is_empty());
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header.split(',').skip(1).map(str::trim).collect();

    rows.filter_map(|line| {
        let values: Vec<&str> = line.split(',').skip(1).map(str::trim).collect();
        if values.len() != headers.len() {
            return None;
        }
        let row: BTreeMap<String, String> = headers
            .iter()
            .zip(values)
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        (!row.is_empty()).then_some(row)
    })
    .collect()
}

/// Adapter class from the driver description.
pub fn classify(description: &str) -> AdapterType {
    let lower = description.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    let has_token = |token: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|t| t == token)
    };

    if has(&["wireless", "wifi", "wi-fi", "802.11"]) {
        AdapterType::Wireless
    } else if has(&["bluetooth"]) || has_token("bt") {
        AdapterType::Bluetooth
    } else if has(&["virtual", "vmware", "virtualbox", "hyper-v"]) {
        AdapterType::Virtual
    } else if has(&["ethernet", "gigabit"]) {
        AdapterType::Ethernet
    } else {
        AdapterType::Other
    }
}
