//! D-Bus client for the Decky daemon.

use anyhow::{Context, Result};
use tracing::debug;
use zbus::names::BusName;
use zbus::{proxy, Connection};

/// Well-known name the daemon claims.
pub const SERVICE_NAME: &str = "org.decky.Daemon";

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BusType {
    Session,
    System,
    /// Try session first, fall back to system.
    #[default]
    Auto,
}

#[proxy(
    interface = "org.decky.Daemon1",
    default_service = "org.decky.Daemon",
    default_path = "/org/decky/Daemon"
)]
trait Daemon1 {
    /// Switches the deck to another page.
    fn switch_page(&self, name: &str) -> zbus::Result<()>;

    fn current_page(&self) -> zbus::Result<String>;

    /// Configured page names, sorted.
    fn list_pages(&self) -> zbus::Result<Vec<String>>;

    /// Sets the deck brightness in percent.
    fn set_brightness(&self, percent: u8) -> zbus::Result<()>;

    /// Shuts down the daemon.
    fn quit(&self) -> zbus::Result<()>;

    /// Whether a deck is connected.
    #[zbus(property)]
    fn connected(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn page(&self) -> zbus::Result<String>;

    /// Model name of the connected deck, empty when none.
    #[zbus(property)]
    fn device_kind(&self) -> zbus::Result<String>;
}

/// Connection to a running daemon.
pub struct DaemonClient {
    proxy: Daemon1Proxy<'static>,
}

impl DaemonClient {
    /// Connects with automatic bus detection.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_bus(BusType::Auto).await
    }

    /// Connects on the given bus.
    ///
    /// `Auto` prefers the session bus and only moves to the system bus when
    /// the daemon is not registered on the session bus.
    pub async fn connect_with_bus(bus_type: BusType) -> Result<Self> {
        let connection = match bus_type {
            BusType::Session => {
                debug!("Connecting to session bus");
                Connection::session()
                    .await
                    .context("Failed to connect to session bus")?
            }
            BusType::System => {
                debug!("Connecting to system bus");
                Connection::system()
                    .await
                    .context("Failed to connect to system bus")?
            }
            BusType::Auto => Self::find_daemon().await?,
        };

        let proxy = Daemon1Proxy::new(&connection)
            .await
            .context("Failed to create D-Bus proxy")?;

        Ok(Self { proxy })
    }

    async fn find_daemon() -> Result<Connection> {
        match Connection::session().await {
            Ok(conn) if Self::service_exists(&conn).await => {
                debug!("Found daemon on session bus");
                Ok(conn)
            }
            Ok(_) => {
                debug!("Daemon not on session bus, trying system bus");
                let conn = Connection::system()
                    .await
                    .context("Failed to connect to system bus")?;
                if Self::service_exists(&conn).await {
                    debug!("Found daemon on system bus");
                    Ok(conn)
                } else {
                    anyhow::bail!(
                        "Daemon service not found on session or system bus. Is deckyd running?"
                    )
                }
            }
            Err(e) => {
                debug!("Session bus unavailable ({}), trying system bus", e);
                Connection::system()
                    .await
                    .context("Failed to connect to any D-Bus")
            }
        }
    }

    async fn service_exists(conn: &Connection) -> bool {
        use zbus::fdo::DBusProxy;
        let Ok(name) = BusName::try_from(SERVICE_NAME) else {
            return false;
        };
        match DBusProxy::new(conn).await {
            Ok(dbus) => dbus.name_has_owner(name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn switch_page(&self, name: &str) -> Result<()> {
        self.proxy
            .switch_page(name)
            .await
            .with_context(|| format!("Failed to switch to page '{}'", name))
    }

    pub async fn current_page(&self) -> Result<String> {
        self.proxy
            .current_page()
            .await
            .context("Failed to get current page via D-Bus")
    }

    pub async fn list_pages(&self) -> Result<Vec<String>> {
        self.proxy
            .list_pages()
            .await
            .context("Failed to list pages via D-Bus")
    }

    pub async fn set_brightness(&self, percent: u8) -> Result<()> {
        self.proxy
            .set_brightness(percent)
            .await
            .context("Failed to set brightness via D-Bus")
    }

    pub async fn is_connected(&self) -> Result<bool> {
        self.proxy
            .connected()
            .await
            .context("Failed to get connection status via D-Bus")
    }

    pub async fn device_kind(&self) -> Result<String> {
        self.proxy
            .device_kind()
            .await
            .context("Failed to get device kind via D-Bus")
    }

    /// Asks the daemon to shut down.
    pub async fn quit(&self) -> Result<()> {
        self.proxy
            .quit()
            .await
            .context("Failed to send quit via D-Bus")
    }
}
