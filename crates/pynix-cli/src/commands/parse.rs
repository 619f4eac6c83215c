//! Handler for `pynix parse`.

use miette::Result;

use pynix_core::requirement::Requirement;

pub fn exec(lines: &[String]) -> Result<()> {
    for line in lines {
        let requirement = Requirement::parse(line)?;
        println!("{requirement}");
        if !requirement.extras.is_empty() {
            let extras: Vec<&str> = requirement.extras.iter().map(String::as_str).collect();
            println!("    extras: {}", extras.join(", "));
        }
        if let Some(build) = &requirement.build {
            println!("    build:  {build}");
        }
        if let Some(marker) = &requirement.marker {
            println!("    marker: {marker}");
        }
    }
    Ok(())
}
