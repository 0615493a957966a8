//! Resolve an initial window the way a pager would.

use anyhow::{bail, Result};
use rowpager_core::resolve_initial;

pub struct WindowOptions {
    pub total: usize,
    pub start: usize,
    pub size: usize,
    pub page_size: usize,
    pub align: bool,
    pub json: bool,
}

pub fn resolve_window(opts: WindowOptions) -> Result<()> {
    if opts.align && opts.page_size == 0 {
        bail!("--page-size must be positive when aligning");
    }

    let align = opts.align.then_some(opts.page_size);
    let window = resolve_initial(opts.start, opts.size, opts.total, align);

    if opts.json {
        println!("{}", serde_json::to_string(&window)?);
    } else {
        println!("{} of {} rows", window, opts.total);
    }
    Ok(())
}
