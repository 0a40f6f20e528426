//! Case bodies declared from another file of the test suite

use testtrace::Case;

pub fn defined_in_fixture_module(case: &Case) {
    let total: u32 = (1..=4).sum();
    if total != 10 {
        case.error("bad sum");
    }
}
