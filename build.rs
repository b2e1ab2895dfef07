const KB_FILES: &[&str] = &[
    "kbs/parameters.kb",
    "kbs/aliases.kb",
    "kbs/collaborations.kb",
    "kbs/doi-registrants.kb",
    "kbs/junk.kb",
];

fn main() {
    // Force recompilation when knowledge base files change.
    // include_str! embeds these at compile time in kb.rs.
    for kb in KB_FILES {
        println!("cargo::rerun-if-changed={kb}");
    }
    let hash = kb_hash();
    println!("cargo::rustc-env=KB_HASH={hash}");
}

fn kb_hash() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    for kb in KB_FILES {
        if let Ok(contents) = std::fs::read_to_string(kb) {
            contents.hash(&mut hasher);
        }
    }
    hasher.finish()
}
