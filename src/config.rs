use clap::ValueEnum;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// How a channel arbitrates between queued transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "verbatim")]
pub enum BusProtocol {
    /// Single monotonic cursor, strict FIFO per channel, never rejects.
    Fifo,
    /// Scheduling table with gap placement; rejects when the table is full.
    Table,
}

/// Per-device simulator configuration. Built once, immutable afterwards,
/// and owned by the topology it describes. Two devices never share one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsdConfig {
    /// Packages per SSD; also the number of bus channels.
    pub ssd_size: u32,
    /// Dies per package.
    pub package_size: u32,
    /// Planes per die.
    pub die_size: u32,
    /// Blocks per plane.
    pub plane_size: u32,
    /// Pages per block.
    pub block_size: u32,

    /// RAM buffer delays (ns) for one page of data.
    pub ram_read_delay: i64,
    pub ram_write_delay: i64,
    /// Page program/read delays (ns).
    pub page_read_delay: i64,
    pub page_write_delay: i64,
    /// Block erase delay (ns).
    pub block_erase_delay: i64,
    /// Plane register transfer delays (ns), accrued during merges.
    pub plane_reg_read_delay: i64,
    pub plane_reg_write_delay: i64,
    /// Bus control/data transfer delays (ns).
    pub bus_ctrl_delay: i64,
    pub bus_data_delay: i64,

    /// Devices allowed to connect to one channel.
    pub bus_max_connect: u32,
    /// Entries in the channel scheduling table (Table protocol only).
    pub bus_table_size: u32,
    pub bus_protocol: BusProtocol,

    /// Erase cycles a block survives when wear levelling is enabled.
    pub block_erases: u64,

    /// Low page bits folded into the channel index to spread sequential
    /// writes of one package across neighbouring channels. 0 routes purely
    /// by package.
    pub bank_group_bit: u32,

    /// Strict page-state checking: reads require VALID. The default (loose)
    /// mode accepts reads of EMPTY pages; writes require EMPTY either way.
    pub strict_page_state: bool,
    /// Track and decrement per-block erase budgets. Off by default; the
    /// wear plumbing stays in place either way.
    pub wear_leveling: bool,
}

impl Default for SsdConfig {
    fn default() -> Self {
        SsdConfig {
            ssd_size: 16,
            package_size: 4,
            die_size: 2,
            plane_size: 1,
            block_size: 64,
            ram_read_delay: 10,
            ram_write_delay: 10,
            page_read_delay: 5000,
            page_write_delay: 20000,
            block_erase_delay: 150000,
            plane_reg_read_delay: 0,
            plane_reg_write_delay: 0,
            bus_ctrl_delay: 5,
            bus_data_delay: 10,
            bus_max_connect: 8,
            bus_table_size: 64,
            bus_protocol: BusProtocol::Fifo,
            block_erases: 1048675,
            bank_group_bit: 0,
            strict_page_state: false,
            wear_leveling: false,
        }
    }
}

impl SsdConfig {
    /// Total flash pages addressable by the topology.
    pub fn total_pages(&self) -> u64 {
        self.ssd_size as u64
            * self.package_size as u64
            * self.die_size as u64
            * self.plane_size as u64
            * self.block_size as u64
    }

    pub fn pages_per_plane(&self) -> u64 {
        self.plane_size as u64 * self.block_size as u64
    }

    pub fn num_channels(&self) -> u32 {
        self.ssd_size
    }

    /// Load `ssd.conf`-style configuration: one `KEY VALUE` pair per line,
    /// blank lines and `#` comments skipped. Unknown keys and malformed
    /// lines are reported and skipped; parsing always completes.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Self {
        let mut cfg = SsdConfig::default();
        for (idx, line) in reader.lines().enumerate() {
            let line_number = idx + 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("config read error on line {}: {}", line_number, e);
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let (name, value) = match (parts.next(), parts.next()) {
                (Some(n), Some(v)) => (n, v),
                _ => {
                    error!("config parsing error on line {}", line_number);
                    continue;
                }
            };
            let value: i64 = match value.parse() {
                Ok(v) => v,
                Err(_) => {
                    error!("config parsing error on line {}", line_number);
                    continue;
                }
            };
            cfg.load_entry(name, value, line_number);
        }
        cfg.clamp_delays();
        cfg
    }

    fn load_entry(&mut self, name: &str, value: i64, line_number: usize) {
        match name {
            "RAM_READ_DELAY" => self.ram_read_delay = value,
            "RAM_WRITE_DELAY" => self.ram_write_delay = value,
            "BUS_CTRL_DELAY" => self.bus_ctrl_delay = value,
            "BUS_DATA_DELAY" => self.bus_data_delay = value,
            "BUS_MAX_CONNECT" => self.bus_max_connect = value as u32,
            "BUS_TABLE_SIZE" => self.bus_table_size = value as u32,
            "SSD_SIZE" => self.ssd_size = value as u32,
            "PACKAGE_SIZE" => self.package_size = value as u32,
            "DIE_SIZE" => self.die_size = value as u32,
            "PLANE_SIZE" => self.plane_size = value as u32,
            "PLANE_REG_READ_DELAY" => self.plane_reg_read_delay = value,
            "PLANE_REG_WRITE_DELAY" => self.plane_reg_write_delay = value,
            "BLOCK_SIZE" => self.block_size = value as u32,
            "BLOCK_ERASES" => self.block_erases = value as u64,
            "BLOCK_ERASE_DELAY" => self.block_erase_delay = value,
            "PAGE_READ_DELAY" => self.page_read_delay = value,
            "PAGE_WRITE_DELAY" => self.page_write_delay = value,
            "BANK_GROUP_BIT" => self.bank_group_bit = value as u32,
            "BUS_PROTOCOL" => {
                self.bus_protocol = if value == 0 {
                    BusProtocol::Fifo
                } else {
                    BusProtocol::Table
                }
            }
            "STRICT_PAGE_STATE" => self.strict_page_state = value != 0,
            "WEAR_LEVELING" => self.wear_leveling = value != 0,
            _ => error!("config file parsing error on line {}", line_number),
        }
    }

    /// Negative delays are configuration errors; clamp to 0 and continue.
    fn clamp_delays(&mut self) {
        for (name, delay) in [
            ("RAM_READ_DELAY", &mut self.ram_read_delay),
            ("RAM_WRITE_DELAY", &mut self.ram_write_delay),
            ("PAGE_READ_DELAY", &mut self.page_read_delay),
            ("PAGE_WRITE_DELAY", &mut self.page_write_delay),
            ("BLOCK_ERASE_DELAY", &mut self.block_erase_delay),
            ("PLANE_REG_READ_DELAY", &mut self.plane_reg_read_delay),
            ("PLANE_REG_WRITE_DELAY", &mut self.plane_reg_write_delay),
            ("BUS_CTRL_DELAY", &mut self.bus_ctrl_delay),
            ("BUS_DATA_DELAY", &mut self.bus_data_delay),
        ] {
            if *delay < 0 {
                warn!("{} is negative, clamping to 0", name);
                *delay = 0;
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, count) in [
            ("SSD_SIZE", self.ssd_size),
            ("PACKAGE_SIZE", self.package_size),
            ("DIE_SIZE", self.die_size),
            ("PLANE_SIZE", self.plane_size),
            ("BLOCK_SIZE", self.block_size),
            ("BUS_TABLE_SIZE", self.bus_table_size),
            ("BUS_MAX_CONNECT", self.bus_max_connect),
        ] {
            if count == 0 {
                return Err(format!("{} must be at least 1", name));
            }
        }
        Ok(())
    }
}

impl Display for SsdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RAM_READ_DELAY {}", self.ram_read_delay)?;
        writeln!(f, "RAM_WRITE_DELAY {}", self.ram_write_delay)?;
        writeln!(f, "BUS_CTRL_DELAY {}", self.bus_ctrl_delay)?;
        writeln!(f, "BUS_DATA_DELAY {}", self.bus_data_delay)?;
        writeln!(f, "BUS_MAX_CONNECT {}", self.bus_max_connect)?;
        writeln!(f, "BUS_TABLE_SIZE {}", self.bus_table_size)?;
        writeln!(f, "SSD_SIZE {}", self.ssd_size)?;
        writeln!(f, "PACKAGE_SIZE {}", self.package_size)?;
        writeln!(f, "DIE_SIZE {}", self.die_size)?;
        writeln!(f, "PLANE_SIZE {}", self.plane_size)?;
        writeln!(f, "PLANE_REG_READ_DELAY {}", self.plane_reg_read_delay)?;
        writeln!(f, "PLANE_REG_WRITE_DELAY {}", self.plane_reg_write_delay)?;
        writeln!(f, "BLOCK_SIZE {}", self.block_size)?;
        writeln!(f, "BLOCK_ERASES {}", self.block_erases)?;
        writeln!(f, "BLOCK_ERASE_DELAY {}", self.block_erase_delay)?;
        writeln!(f, "PAGE_READ_DELAY {}", self.page_read_delay)?;
        writeln!(f, "PAGE_WRITE_DELAY {}", self.page_write_delay)?;
        writeln!(f, "BANK_GROUP_BIT {}", self.bank_group_bit)
    }
}
