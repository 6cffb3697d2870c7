use anyhow::Result;

use scumm_engine::cli::{self, Command};
use scumm_engine::runtime;

fn main() -> Result<()> {
    env_logger::init();
    match cli::parse()? {
        Command::Run(args) => runtime::execute(args),
        Command::ListOpcodes(args) => runtime::list_opcodes(args),
    }
}
