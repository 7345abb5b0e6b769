//! Linear-solve backend listing.

use anyhow::Result;
use gridips_core::SolverKind;

pub fn list_solvers() -> Result<()> {
    let default = SolverKind::default();
    for name in SolverKind::available() {
        let kind: SolverKind = name.parse()?;
        if kind == default {
            println!("{name} (default)");
        } else {
            println!("{name}");
        }
    }
    Ok(())
}
