//! Client address to location resolution.
//!
//! A `geoip_path` ending in `.mmdb` opens a MaxMind GeoIP2/GeoLite2 City
//! database ([`MaxMindLocator`]). Any other path is read as a [`GeoTable`]: a
//! static list of networks in TOML where the most specific match wins.
//! Without a path, [`NoLocator`] resolves nothing and EEA-restricted files
//! stay undownloadable.
//!
//! ```toml
//! [[networks]]
//! cidr = "192.0.2.0/24"
//! continent = "Europe"
//! country = "Germany"
//! city = "Berlin"
//! is_eu = true
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use crate::model::Location;

/// Resolves an address to a location.
pub trait GeoLocator: Send + Sync + 'static {
    fn lookup(&self, ip: IpAddr) -> Option<Location>;
}

/// Shared handle to a locator.
pub type SharedLocator = Arc<dyn GeoLocator>;

/// Locator that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocator;

impl GeoLocator for NoLocator {
    fn lookup(&self, _ip: IpAddr) -> Option<Location> {
        None
    }
}

/// Network with a prefix length, e.g. `10.0.0.0/8` or `2001:db8::/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    addr: IpAddr,
    prefix: u8,
}

impl Network {
    /// Parse CIDR notation. A bare address is a host network.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed address or an out-of-range prefix.
    pub fn parse(cidr: &str) -> Result<Self> {
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };
        let addr: IpAddr = addr
            .trim()
            .parse()
            .with_context(|| format!("Invalid network address in '{cidr}'"))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid prefix length in '{cidr}'"))?,
            None => max,
        };
        if prefix > max {
            bail!("Prefix length {prefix} exceeds {max} in '{cidr}'");
        }
        Ok(Self { addr, prefix })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            },
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            },
            _ => false,
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableFile {
    #[serde(default)]
    networks: Vec<NetworkEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkEntry {
    cidr: String,
    #[serde(default)]
    continent: String,
    country: String,
    #[serde(default)]
    subdivision1: String,
    #[serde(default)]
    subdivision2: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    is_eu: bool,
}

/// Static network table, matched by longest prefix.
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    entries: Vec<(Network, Location)>,
}

impl GeoTable {
    /// Load a table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or an entry is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read geo table: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse geo table: {}", path.display()))
    }

    /// Parse a table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML or a malformed network.
    pub fn parse(content: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(content)?;
        let mut entries = Vec::with_capacity(file.networks.len());
        for entry in file.networks {
            let network = Network::parse(&entry.cidr)?;
            entries.push((
                network,
                Location {
                    continent: entry.continent,
                    country: entry.country,
                    subdivision1: entry.subdivision1,
                    subdivision2: entry.subdivision2,
                    city: entry.city,
                    is_eu: entry.is_eu,
                },
            ));
        }
        // Most specific first, so the first hit is the longest prefix.
        entries.sort_by(|a, b| b.0.prefix().cmp(&a.0.prefix()));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoLocator for GeoTable {
    fn lookup(&self, ip: IpAddr) -> Option<Location> {
        self.entries
            .iter()
            .find(|(network, _)| network.contains(ip))
            .map(|(_, location)| location.clone())
    }
}

/// The parts of a GeoIP2 City record this service reads.
#[derive(Debug, Default, Deserialize)]
struct CityRecord {
    #[serde(default)]
    continent: Option<Named>,
    #[serde(default)]
    country: Option<CountryRecord>,
    #[serde(default)]
    subdivisions: Vec<Named>,
    #[serde(default)]
    city: Option<Named>,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    names: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct CountryRecord {
    #[serde(default)]
    names: BTreeMap<String, String>,
    #[serde(default)]
    is_in_european_union: bool,
}

fn english(names: &BTreeMap<String, String>) -> String {
    names.get("en").cloned().unwrap_or_default()
}

impl From<CityRecord> for Location {
    fn from(record: CityRecord) -> Self {
        let subdivision = |i: usize| {
            record
                .subdivisions
                .get(i)
                .map(|s| english(&s.names))
                .unwrap_or_default()
        };
        Self {
            continent: record
                .continent
                .as_ref()
                .map(|c| english(&c.names))
                .unwrap_or_default(),
            country: record
                .country
                .as_ref()
                .map(|c| english(&c.names))
                .unwrap_or_default(),
            subdivision1: subdivision(0),
            subdivision2: subdivision(1),
            city: record
                .city
                .as_ref()
                .map(|c| english(&c.names))
                .unwrap_or_default(),
            is_eu: record
                .country
                .as_ref()
                .is_some_and(|c| c.is_in_european_union),
        }
    }
}

/// MaxMind City database, names in English.
pub struct MaxMindLocator {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindLocator {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a MaxMind DB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = maxminddb::Reader::open_readfile(path)
            .with_context(|| format!("Failed to open GeoIP database: {}", path.display()))?;
        Ok(Self { reader })
    }

    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }
}

impl GeoLocator for MaxMindLocator {
    fn lookup(&self, ip: IpAddr) -> Option<Location> {
        match self.reader.lookup::<CityRecord>(ip) {
            Ok(record) => record.map(Location::from),
            Err(e) => {
                tracing::debug!(%ip, error = %e, "GeoIP lookup failed");
                None
            },
        }
    }
}

fn is_mmdb(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mmdb"))
}

/// Build the locator for an optional `geoip_path`.
///
/// # Errors
///
/// Returns an error if the database or table cannot be loaded.
pub fn open(path: Option<&Path>) -> Result<SharedLocator> {
    match path {
        Some(path) if is_mmdb(path) => {
            let locator = MaxMindLocator::open(path)?;
            tracing::info!(
                path = %path.display(),
                database_type = locator.database_type(),
                "Opened GeoIP database"
            );
            Ok(Arc::new(locator))
        },
        Some(path) => {
            let table = GeoTable::load(path)?;
            tracing::info!(networks = table.len(), path = %path.display(), "Loaded geo table");
            Ok(Arc::new(table))
        },
        None => Ok(Arc::new(NoLocator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
[[networks]]
cidr = "10.0.0.0/8"
continent = "Europe"
country = "Germany"
is_eu = true

[[networks]]
cidr = "10.20.0.0/16"
continent = "Europe"
country = "Switzerland"
city = "Zurich"

[[networks]]
cidr = "2001:db8::/32"
continent = "North America"
country = "United States"
"#;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_network_parse() {
        assert!(Network::parse("192.0.2.0/24").is_ok());
        assert!(Network::parse("192.0.2.7").is_ok());
        assert!(Network::parse("192.0.2.0/33").is_err());
        assert!(Network::parse("2001:db8::/129").is_err());
        assert!(Network::parse("not-an-ip/8").is_err());
        assert!(Network::parse("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_network_contains() {
        let net = Network::parse("192.0.2.0/24").unwrap();
        assert!(net.contains(ip("192.0.2.200")));
        assert!(!net.contains(ip("192.0.3.1")));
        // IPv4-mapped IPv6
        assert!(net.contains(ip("::ffff:192.0.2.5")));

        let all = Network::parse("0.0.0.0/0").unwrap();
        assert!(all.contains(ip("203.0.113.9")));
        assert!(!all.contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = GeoTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 3);

        let loc = table.lookup(ip("10.20.1.1")).unwrap();
        assert_eq!(loc.country, "Switzerland");
        assert_eq!(loc.city, "Zurich");
        assert!(!loc.is_eu);

        let loc = table.lookup(ip("10.1.1.1")).unwrap();
        assert_eq!(loc.country, "Germany");
        assert!(loc.is_eu);

        assert_eq!(
            table.lookup(ip("2001:db8::42")).unwrap().country,
            "United States"
        );
        assert!(table.lookup(ip("198.51.100.1")).is_none());
    }

    #[test]
    fn test_no_locator() {
        assert!(NoLocator.lookup(ip("10.0.0.1")).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo.toml");
        fs::write(&path, TABLE).unwrap();
        let locator = open(Some(&path)).unwrap();
        assert!(locator.lookup(ip("10.0.0.1")).is_some());

        assert!(open(Some(&dir.path().join("missing.toml"))).is_err());
        assert!(open(None).unwrap().lookup(ip("10.0.0.1")).is_none());
    }

    #[test]
    fn test_city_record_maps_english_names() {
        let named = |en: &str| Named {
            names: BTreeMap::from([
                ("de".to_string(), "egal".to_string()),
                ("en".to_string(), en.to_string()),
            ]),
        };
        let record = CityRecord {
            continent: Some(named("Europe")),
            country: Some(CountryRecord {
                names: named("Germany").names,
                is_in_european_union: true,
            }),
            subdivisions: vec![named("Bavaria"), named("Upper Bavaria")],
            city: Some(named("Munich")),
        };
        assert_eq!(
            Location::from(record),
            Location {
                continent: "Europe".to_string(),
                country: "Germany".to_string(),
                subdivision1: "Bavaria".to_string(),
                subdivision2: "Upper Bavaria".to_string(),
                city: "Munich".to_string(),
                is_eu: true,
            }
        );
    }

    #[test]
    fn test_sparse_city_record() {
        let record = CityRecord {
            country: Some(CountryRecord {
                names: BTreeMap::from([("en".to_string(), "Norway".to_string())]),
                is_in_european_union: false,
            }),
            ..Default::default()
        };
        let location = Location::from(record);
        assert_eq!(location.country, "Norway");
        assert!(location.continent.is_empty());
        assert!(location.subdivision1.is_empty());
        assert!(!location.is_eu);
    }

    #[test]
    fn test_mmdb_path_opens_maxmind_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GeoLite2-City.mmdb");
        fs::write(&path, b"not a maxmind database").unwrap();
        let err = open(Some(&path)).err().unwrap();
        assert!(format!("{err:#}").contains("GeoIP database"));
        assert!(is_mmdb(Path::new("x.MMDB")));
        assert!(!is_mmdb(Path::new("networks.toml")));
    }

    #[test]
    fn test_malformed_entry_rejected() {
        let bad = "[[networks]]\ncidr = \"10.0.0.0/40\"\ncountry = \"Nowhere\"\n";
        assert!(GeoTable::parse(bad).is_err());
    }
}
