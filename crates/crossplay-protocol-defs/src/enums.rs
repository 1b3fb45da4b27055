use crossplay_registry::{network_enum, EnumRegistry, NamedIdSpace, RegistryKey};
use std::sync::Arc;

pub const BOSS_BAR_COLOR: RegistryKey = RegistryKey::from_static("crossplay:boss_bar_color");
pub const BOSS_BAR_DIVISION: RegistryKey = RegistryKey::from_static("crossplay:boss_bar_division");

network_enum! {
    pub enum BossBarColor {
        Pink => "pink",
        Blue => "blue",
        Red => "red",
        Green => "green",
        Yellow => "yellow",
        Purple => "purple",
        White => "white",
    }
}

network_enum! {
    pub enum BossBarDivision {
        None => "none",
        SixNotches => "six_notches",
        TenNotches => "ten_notches",
        TwelveNotches => "twelve_notches",
        TwentyNotches => "twenty_notches",
    }
}

/// Registries that are compiled in rather than loaded from snapshots.
/// They are identical in every supported revision.
pub fn builtin_registries() -> Vec<Arc<dyn NamedIdSpace>> {
    vec![
        Arc::new(EnumRegistry::<BossBarColor>::new(BOSS_BAR_COLOR)),
        Arc::new(EnumRegistry::<BossBarDivision>::new(BOSS_BAR_DIVISION)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossplay_registry::{Registry, NetworkEnum};

    #[test]
    fn test_boss_bar_enums() {
        let colors = EnumRegistry::<BossBarColor>::new(BOSS_BAR_COLOR);
        assert_eq!(colors.len(), 7);
        assert_eq!(colors.raw_id_by_name("purple"), Some(5));
        assert_eq!(BossBarDivision::TwentyNotches.ordinal(), 4);
        let keys: Vec<String> = builtin_registries()
            .iter()
            .map(|r| r.registry_key().to_string())
            .collect();
        assert_eq!(keys, vec!["crossplay:boss_bar_color", "crossplay:boss_bar_division"]);
    }
}
