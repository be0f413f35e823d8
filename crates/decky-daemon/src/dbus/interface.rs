//! D-Bus interface implementation using zbus.
//!
//! Provides the `org.decky.Daemon1` interface.

use std::sync::Arc;

use tracing::{debug, info, warn};
use zbus::{interface, Connection};

use crate::config::DbusBusType;
use crate::controller::Controller;

/// Well-known bus name.
pub const BUS_NAME: &str = "org.decky.Daemon";

/// Object path of the daemon interface.
pub const OBJECT_PATH: &str = "/org/decky/Daemon";

/// D-Bus interface implementation for the Decky daemon.
pub struct Daemon1Interface {
    controller: Arc<Controller>,
}

impl Daemon1Interface {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}

#[interface(name = "org.decky.Daemon1")]
impl Daemon1Interface {
    /// Switches the active page.
    async fn switch_page(&self, name: String) -> zbus::fdo::Result<()> {
        let controller = self.controller.clone();
        let page = name.clone();
        tokio::task::spawn_blocking(move || controller.switch_page(&page))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;

        debug!("D-Bus: SwitchPage({})", name);
        Ok(())
    }

    /// Gets the active page name.
    fn current_page(&self) -> String {
        self.controller.current_page()
    }

    /// Lists configured pages.
    fn list_pages(&self) -> Vec<String> {
        self.controller.page_names()
    }

    /// Sets panel brightness (0-100).
    async fn set_brightness(&self, percent: u8) -> zbus::fdo::Result<()> {
        if percent > 100 {
            return Err(zbus::fdo::Error::InvalidArgs(
                "Brightness must be 0-100".to_string(),
            ));
        }
        let controller = self.controller.clone();
        tokio::task::spawn_blocking(move || controller.set_brightness(percent))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        debug!("D-Bus: SetBrightness({})", percent);
        Ok(())
    }

    /// Requests daemon shutdown.
    fn quit(&self) {
        info!("D-Bus: Quit requested");
        self.controller.request_shutdown();
    }

    // Properties

    /// Whether a panel is connected.
    #[zbus(property)]
    fn connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// Active page name.
    #[zbus(property)]
    fn page(&self) -> String {
        self.controller.current_page()
    }

    /// Model of the connected panel, empty when none.
    #[zbus(property)]
    fn device_kind(&self) -> String {
        self.controller
            .device_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_default()
    }
}

/// Connects to the configured bus and exports the interface.
///
/// Returns `None` when D-Bus is disabled in the configuration.
pub async fn run_dbus_server(
    controller: Arc<Controller>,
    bus_type: DbusBusType,
) -> anyhow::Result<Option<Connection>> {
    let Some((connection, bus_name)) = connect_to_bus(bus_type).await? else {
        info!("D-Bus interface disabled");
        return Ok(None);
    };

    connection
        .object_server()
        .at(OBJECT_PATH, Daemon1Interface::new(controller))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register object: {}", e))?;

    connection
        .request_name(BUS_NAME)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to request bus name: {}", e))?;

    info!("D-Bus service registered at {} on {} bus", BUS_NAME, bus_name);
    Ok(Some(connection))
}

async fn connect_to_bus(
    bus_type: DbusBusType,
) -> anyhow::Result<Option<(Connection, &'static str)>> {
    match bus_type {
        DbusBusType::Off => Ok(None),
        DbusBusType::Session => {
            let conn = Connection::session()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to session bus: {}", e))?;
            Ok(Some((conn, "session")))
        }
        DbusBusType::System => {
            let conn = Connection::system()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
            Ok(Some((conn, "system")))
        }
        DbusBusType::Auto => match Connection::session().await {
            Ok(conn) => Ok(Some((conn, "session"))),
            Err(session_err) => {
                warn!(
                    "Session bus unavailable ({}), trying system bus",
                    session_err
                );
                let conn = Connection::system().await.map_err(|system_err| {
                    anyhow::anyhow!(
                        "Failed to connect to any D-Bus: session={}, system={}",
                        session_err,
                        system_err
                    )
                })?;
                Ok(Some((conn, "system")))
            }
        },
    }
}
