//! CPE 2.3 formatted-string handling.

const LINUX_VENDORS: &[&str] = &[
    "debian",
    "canonical",
    "redhat",
    "fedoraproject",
    "suse",
    "oracle",
    "linux",
];

const LINUX_PRODUCTS: &[&str] = &[
    "debian_linux",
    "ubuntu_linux",
    "red_hat_enterprise_linux",
    "fedora",
    "suse_linux",
    "oracle_linux",
    "linux_kernel",
];

/// The fields of a `cpe:2.3:part:vendor:product:version:...` string we use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpeName {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub target_hw: Option<String>,
}

/// Splits on `:` while keeping `\:` escapes inside a component.
fn split_components(criteria: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = criteria.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

impl CpeName {
    /// `None` for anything that does not reach the product component.
    pub fn parse(criteria: &str) -> Option<Self> {
        let parts = split_components(criteria.trim());
        if parts.len() < 5 || parts[0] != "cpe" {
            return None;
        }
        let vendor = parts[3].clone();
        let product = parts[4].clone();
        if vendor.is_empty() || product.is_empty() {
            return None;
        }
        Some(CpeName {
            part: parts[2].clone(),
            vendor,
            product,
            version: parts.get(5).cloned().unwrap_or_else(|| "*".to_string()),
            target_hw: parts
                .get(11)
                .filter(|hw| !hw.is_empty() && hw.as_str() != "*" && hw.as_str() != "-")
                .cloned(),
        })
    }
}

pub fn is_linux_cpe(vendor: &str, product: &str, target_hw: Option<&str>) -> bool {
    LINUX_VENDORS.contains(&vendor)
        || LINUX_PRODUCTS.contains(&product)
        || target_hw == Some("linux_kernel")
}
