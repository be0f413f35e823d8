//! Desktop session queries over D-Bus.
//!
//! Platform calls run on blocking worker threads, so these use the
//! blocking proxies. Bus connections are opened on first use and reused.

use parking_lot::Mutex;
use tracing::debug;
use zbus::blocking::fdo::DBusProxy;
use zbus::blocking::Connection;
use zbus::names::BusName;
use zbus::proxy;
use zbus::proxy::CacheProperties;
use zbus::zvariant::OwnedObjectPath;

use super::MediaCommand;

/// Bus name prefix every MPRIS player registers under.
const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";

#[proxy(interface = "org.freedesktop.ScreenSaver", default_path = "/ScreenSaver")]
trait ScreenSaver {
    fn get_active(&self) -> zbus::Result<bool>;
}

#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    fn get_session(&self, session_id: &str) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.login1.Session",
    default_service = "org.freedesktop.login1"
)]
trait LoginSession {
    #[zbus(property)]
    fn locked_hint(&self) -> zbus::Result<bool>;
}

#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait MediaPlayer {
    fn play_pause(&self) -> zbus::Result<()>;
    fn next(&self) -> zbus::Result<()>;
    fn previous(&self) -> zbus::Result<()>;
    fn stop(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;
}

/// Lazily connected session and system buses.
#[derive(Default)]
pub struct DesktopBus {
    session: Mutex<Option<Connection>>,
    system: Mutex<Option<Connection>>,
}

impl DesktopBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(
        slot: &Mutex<Option<Connection>>,
        open: fn() -> zbus::Result<Connection>,
    ) -> Option<Connection> {
        let mut slot = slot.lock();
        if slot.is_none() {
            match open() {
                Ok(conn) => *slot = Some(conn),
                Err(e) => {
                    debug!("D-Bus connection failed: {}", e);
                    return None;
                }
            }
        }
        slot.clone()
    }

    fn session(&self) -> Option<Connection> {
        Self::connect(&self.session, Connection::session)
    }

    fn system(&self) -> Option<Connection> {
        Self::connect(&self.system, Connection::system)
    }

    /// Whether `name` is currently owned on the session bus.
    pub fn session_name_has_owner(&self, name: &str) -> bool {
        let Some(conn) = self.session() else {
            return false;
        };
        let Ok(name) = BusName::try_from(name) else {
            return false;
        };
        match DBusProxy::new(&conn) {
            Ok(dbus) => dbus.name_has_owner(name).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// `GetActive` on a screensaver service. `None` when the service does
    /// not answer.
    pub fn screensaver_active(&self, service: &str) -> Option<bool> {
        let conn = self.session()?;
        let active = ScreenSaverProxyBlocking::builder(&conn)
            .destination(service)
            .and_then(|b| b.build())
            .and_then(|proxy| proxy.get_active());
        match active {
            Ok(active) => Some(active),
            Err(e) => {
                debug!("{} GetActive failed: {}", service, e);
                None
            }
        }
    }

    /// logind's `LockedHint` for this session.
    pub fn logind_locked_hint(&self) -> Option<bool> {
        let conn = self.system()?;
        let session = std::env::var("XDG_SESSION_ID").unwrap_or_else(|_| "auto".to_string());
        match query_locked_hint(&conn, &session) {
            Ok(locked) => Some(locked),
            Err(e) => {
                debug!("logind LockedHint query failed: {}", e);
                None
            }
        }
    }

    /// Sends a transport command to the most relevant MPRIS player.
    pub fn media_command(&self, command: MediaCommand) -> bool {
        let Some(conn) = self.session() else {
            return false;
        };
        match send_media_command(&conn, command) {
            Ok(sent) => sent,
            Err(e) => {
                debug!("MPRIS {} failed: {}", command, e);
                false
            }
        }
    }
}

fn query_locked_hint(conn: &Connection, session: &str) -> zbus::Result<bool> {
    let path = LoginManagerProxyBlocking::new(conn)?.get_session(session)?;
    LoginSessionProxyBlocking::builder(conn)
        .path(path.into_inner())?
        .cache_properties(CacheProperties::No)
        .build()?
        .locked_hint()
}

fn send_media_command(conn: &Connection, command: MediaCommand) -> zbus::Result<bool> {
    let mut players = Vec::new();
    for name in DBusProxy::new(conn)?.list_names()? {
        let name = name.as_str().to_string();
        if !name.starts_with(MPRIS_PREFIX) {
            continue;
        }
        let status = player_proxy(conn, &name)?
            .playback_status()
            .unwrap_or_default();
        players.push((name, status));
    }

    let Some(target) = choose_player(&players) else {
        debug!("No MPRIS player for {}", command);
        return Ok(false);
    };
    let player = player_proxy(conn, target)?;
    match command {
        MediaCommand::PlayPause => player.play_pause()?,
        MediaCommand::Next => player.next()?,
        MediaCommand::Previous => player.previous()?,
        MediaCommand::Stop => player.stop()?,
    }
    debug!("Sent {} to {}", command, target);
    Ok(true)
}

fn player_proxy<'a>(
    conn: &Connection,
    name: &'a str,
) -> zbus::Result<MediaPlayerProxyBlocking<'a>> {
    MediaPlayerProxyBlocking::builder(conn)
        .destination(name)?
        .cache_properties(CacheProperties::No)
        .build()
}

/// Picks a playing player, then a paused one, then whichever registered
/// first.
fn choose_player(players: &[(String, String)]) -> Option<&str> {
    ["Playing", "Paused"]
        .iter()
        .find_map(|wanted| players.iter().find(|(_, status)| status == wanted))
        .or_else(|| players.first())
        .map(|(name, _)| name.as_str())
}
