use blockmgr::{
    config::{logger, Config},
    factory, BlockId, BlockMgr,
};
use std::{
    env,
    io::{self, Write},
};

const USAGE: &str = "Usage: blockdump <path> <block size> [block id]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).ok_or(USAGE)?;
    let block_size: usize = args.get(2).ok_or(USAGE)?.parse()?;
    let block_id: Option<BlockId> = args.get(3).map(|id| id.parse()).transpose()?;

    let config = Config::new().with_block_size(block_size).with_read_only(true);
    logger::init(config.log_level)?;

    let mgr = factory::direct(path, &config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match block_id {
        Some(id) => {
            mgr.begin_read()?;
            let block = mgr.get_read(id)?;
            writeln!(out, "block {id} ({} bytes)", block.size())?;
            hex_dump(&mut out, block.contents())?;
            mgr.release(block)?;
            mgr.end_read()?;
        }
        None => {
            writeln!(out, "{path}: {} blocks of {block_size} bytes", mgr.alloc_limit())?;
        }
    }

    mgr.close()?;
    Ok(())
}

/// Writes `data` 16 bytes per line: offset, hex bytes, then printable ASCII.
fn hex_dump(out: &mut impl Write, data: &[u8]) -> io::Result<()> {
    for (line, chunk) in data.chunks(16).enumerate() {
        write!(out, "{:08x} ", line * 16)?;
        for byte in chunk {
            write!(out, " {byte:02x}")?;
        }
        for _ in chunk.len()..16 {
            write!(out, "   ")?;
        }
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        writeln!(out, "  |{text}|")?;
    }
    Ok(())
}
