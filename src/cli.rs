use crate::config::BusProtocol;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ASCII trace file to replay (`time diskno vaddr size op` per line).
    pub trace: Option<String>,

    /// Configuration file in `KEY VALUE` format.
    #[arg(short, long, default_value = "ssd.conf")]
    pub config: String,

    /// Dump the effective configuration and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,

    /// Override the channel arbitration protocol.
    #[arg(long, value_enum)]
    pub protocol: Option<BusProtocol>,
}
