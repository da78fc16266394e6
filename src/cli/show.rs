use std::path::Path;

use anyhow::Result;

use cybertwin::classify::WorkloadLabel;
use cybertwin::knowledge::KnowledgeCache;

pub fn run_show(path: &Path) -> Result<()> {
    let cache = KnowledgeCache::open(path);
    println!("CYBERTWIN KNOWLEDGE: {}", path.display());
    println!();

    println!("{:<22} {:<12} {:<10}", "LABEL", "CONFIG", "COST");
    println!("{}", "-".repeat(46));
    for label in WorkloadLabel::ALL {
        match cache.lookup(label) {
            Some(e) => println!("{:<22} {:<12} {:<10.1}", label.as_str(), e.configuration.to_string(), e.cost),
            None => println!("{:<22} {:<12} {:<10}", label.as_str(), "-", "-"),
        }
    }
    println!("\n{}/{} LABELS LEARNED", cache.len(), WorkloadLabel::ALL.len());
    Ok(())
}
