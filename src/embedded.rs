use rust_embed::RustEmbed;

/// Prompt template variants (`<phase>.verbose.tpl` / `<phase>.concise.tpl`),
/// embedded into the binary at compile time so the service needs no
/// filesystem access beyond config.toml to run (spec.md §4.10).
#[derive(RustEmbed)]
#[folder = "assets/prompts"]
pub struct PromptAssets;

/// The fixed engineer profile fixture (spec.md §3 "Engineer Profile"),
/// embedded the same way: a read-only data store with no build-time
/// generation logic of its own, per spec.md §1's explicit out-of-scope list.
#[derive(RustEmbed)]
#[folder = "assets/profile"]
pub struct ProfileAssets;
