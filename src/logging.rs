use log::LevelFilter;

/// Installs the device log sink. Other targets bring their own logger and only
/// get the level applied.
pub fn init(level: LevelFilter) {
    #[cfg(target_arch = "xtensa")]
    esp_println::logger::init_logger(level);

    #[cfg(not(target_arch = "xtensa"))]
    log::set_max_level(level);
}
