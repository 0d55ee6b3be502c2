#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // If using the `binstart` feature of `esp-idf-sys`, always keep this module imported

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use log::{error, info};

    // Initialize the ESP-IDF system
    esp_idf_sys::link_patches();

    // Configure logging
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP32 starting up...");

    let config = espc3_station::config::create_config();
    info!("Configuration loaded, mode: {:?}", config.mode());

    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    info!("Peripherals initialized");

    if let Err(e) = firmware::run(peripherals, config) {
        // Fatal bring-up errors end the process here
        error!("Error running application: {}", e);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::thread;

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::{info, warn};

    use espc3_station::config::{AppConfig, AppMode};
    use espc3_station::error::{RadioError, Result};
    use espc3_station::esp::{EspEvents, EspNvsFlash, EspRadio};
    use espc3_station::radio::ClientSettings;
    use espc3_station::StationManager;

    pub fn run(peripherals: Peripherals, config: AppConfig) -> Result<()> {
        let sysloop = EspSystemEventLoop::take().map_err(|e| RadioError::Driver {
            op: "esp_event_loop_create_default",
            code: e.code(),
        })?;

        let radio = EspRadio::new(peripherals.modem, sysloop.clone());
        let mut manager = StationManager::new(radio, EspEvents::new(sysloop))?;
        manager.initialize(&mut EspNvsFlash)?;
        info!("WiFi initialization complete");

        match config.mode() {
            AppMode::Scan => loop {
                if let Err(e) = manager.scan(config.scan.max_access_points) {
                    warn!("Scan failed: {}", e);
                }
                info!("Next scan in {:?}", config.scan.interval);
                thread::sleep(config.scan.interval);
            },
            AppMode::Station => {
                let settings = ClientSettings::new(config.wifi.credentials()?, config.wifi.options);
                manager.connect(settings, config.reconnect)?;

                match manager.wait_for_ip(config.connect_timeout) {
                    Ok(ip) => info!("Station up at {}", ip),
                    Err(e) => warn!("{}; still trying in the background", e),
                }

                // 保持程序运行并报告状态变化
                let states = manager.watch();
                for state in states {
                    info!("Station is {}", state);
                }
                Ok(())
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("espc3-station is firmware for the ESP-IDF target; build with `--target riscv32imc-esp-espidf`.");
}
