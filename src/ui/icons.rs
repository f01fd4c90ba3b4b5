//! Shared UI icons with plain-text fallbacks.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "[LINK]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
