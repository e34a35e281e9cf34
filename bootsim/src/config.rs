//! Simulator configuration, read from TOML.
//!
//! ```toml
//! [device]
//! clock_hz = 100_000_000
//! chip_id = 0x0000_0035
//! cfgword = 0xffff_ffff
//!
//! [link]
//! listen = "127.0.0.1:5555"
//! baud = 115200
//! ```
//!
//! Every key is optional.

use std::io::Read;

use serde::Deserialize;

use uartboot::{BOOT_NAME, Identity};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: DeviceConfig,
    pub link: LinkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Reference clock of the simulated UART and timers.
    pub clock_hz: u32,
    pub chip_id: u32,
    pub cpu_id: u32,
    /// Initial access-control word in NVR.
    pub cfgword: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            clock_hz: 100_000_000,
            chip_id: 0x0000_0035,
            cpu_id: 0x410f_c241,
            cfgword: u32::MAX,
        }
    }
}

impl DeviceConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            chip_id: self.chip_id,
            cpu_id: self.cpu_id,
            version: uartboot::BOOT_VERSION,
            name: BOOT_NAME,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub listen: String,
    /// Rate at which the host's training character is replayed to the autobaud logic.
    pub baud: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            listen: String::from("127.0.0.1:5555"),
            baud: 115_200,
        }
    }
}

pub fn load<R: Read>(mut input: R) -> Result<Config, String> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|e| format!("Could not read configuration ({e})"))?;

    let config: Config =
        toml::from_str(&text).map_err(|e| format!("Invalid configuration ({e})"))?;

    let (baud, clock) = (u64::from(config.link.baud), u64::from(config.device.clock_hz));
    if baud == 0 || clock < 16 * baud {
        return Err(format!(
            "Baud rate {} not reachable from a {} Hz clock",
            config.link.baud, config.device.clock_hz
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = load("".as_bytes()).unwrap();
        assert_eq!(config.device.clock_hz, 100_000_000);
        assert_eq!(config.device.cfgword, u32::MAX);
        assert_eq!(config.link.baud, 115_200);
        assert_eq!(config.device.identity().name, uartboot::BOOT_NAME);
    }

    #[test]
    fn partial_sections() {
        let text = "[device]\ncfgword = 0x0000_00c4\n\n[link]\nbaud = 9600\n";
        let config = load(text.as_bytes()).unwrap();
        assert_eq!(config.device.cfgword, 0xc4);
        assert_eq!(config.device.clock_hz, 100_000_000);
        assert_eq!(config.link.baud, 9600);
        assert_eq!(config.link.listen, "127.0.0.1:5555");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(load("[device]\nflash_kb = 64\n".as_bytes()).is_err());
    }

    #[test]
    fn rejects_unreachable_baud() {
        assert!(load("[link]\nbaud = 0\n".as_bytes()).is_err());
        assert!(load("[device]\nclock_hz = 1000000\n[link]\nbaud = 115200\n".as_bytes()).is_err());
    }
}
