//! Probe listing command

use crate::programmers;

pub fn run_probe(programmer: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = programmers::open_backend(programmer)?;
    let probes = backend.list_probes()?;

    if probes.is_empty() {
        println!("No probes found.");
        return Ok(());
    }

    println!("{} probe(s) attached:", probes.len());
    for p in &probes {
        match &p.product {
            Some(product) => println!("  {:<10}  {}", p.serial, product),
            None => println!("  {}", p.serial),
        }
    }
    Ok(())
}
