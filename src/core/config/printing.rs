use crate::core::config::data::{path_display, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match Self::get_config_path() {
            Some(path) => println!("  file: {}", path_display(path)),
            None => println!("  file: (none)"),
        }
        println!("  base-url: {}", self.base_url());
        println!("  oneapi-base-url: {}", self.oneapi_base_url());
        println!("  request-timeout: {}s", self.request_timeout().as_secs());
        println!("  oneapi-timeout: {}s", self.oneapi_timeout().as_secs());
        println!("  refresh-interval: {}s", self.refresh_interval().as_secs());
        println!("  storage-dir: {}", path_display(self.storage_dir()));
    }
}
