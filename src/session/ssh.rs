use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use regex_lite::Regex;

use super::{Connector, DeviceSession};
use crate::error::PushError;
use crate::models::{device_type, Connection};

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// CLI dialect of a device family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub config_enter: &'static str,
    pub config_exit: &'static str,
    pub save_command: &'static str,
    pub paging_off: &'static str,
}

const IOS: Platform = Platform {
    config_enter: "configure terminal",
    config_exit: "end",
    save_command: "write memory",
    paging_off: "terminal length 0",
};

impl Platform {
    pub fn for_device_type(device_type: &str) -> Self {
        match device_type {
            device_type::CISCO_IOS | device_type::CISCO_XE | device_type::ARISTA_EOS => IOS,
            device_type::CISCO_NXOS => Platform {
                save_command: "copy running-config startup-config",
                ..IOS
            },
            other => {
                tracing::warn!("Unknown device_type '{}', using IOS-style CLI", other);
                IOS
            }
        }
    }
}

/// SshConnector opens interactive CLI sessions over SSH (libssh2)
#[derive(Debug, Clone)]
pub struct SshConnector {
    timeout: Duration,
    idle: Duration,
}

impl SshConnector {
    pub fn new(timeout: Duration, idle: Duration) -> Self {
        Self { timeout, idle }
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    fn connect(&self, connection: &Connection) -> Result<SshSession, PushError> {
        let host = connection.host.as_str();
        let session = ssh_connect(
            host,
            connection.port,
            &connection.username,
            &connection.password,
            self.timeout,
        )
        .map_err(|e| PushError::connect(host, e))?;

        let mut channel = session
            .channel_session()
            .map_err(|e| PushError::connect(host, format!("Failed to open channel: {}", e)))?;
        channel
            .request_pty("vt100", None, Some((200, 24, 0, 0)))
            .map_err(|e| PushError::connect(host, format!("PTY request failed: {}", e)))?;
        channel
            .shell()
            .map_err(|e| PushError::connect(host, format!("Failed to start shell: {}", e)))?;

        // Reads poll with a short timeout so a quiet channel ends a read
        session.set_timeout(self.idle.as_millis().max(1) as u32);

        let mut ssh = SshSession {
            session,
            channel,
            host: host.to_string(),
            platform: Platform::for_device_type(&connection.device_type),
            timeout: self.timeout,
            prompt: None,
        };

        let banner = ssh.read_until_prompt().map_err(|e| PushError::connect(host, e))?;
        ssh.prompt = prompt_pattern(&banner);
        if ssh.prompt.is_none() {
            tracing::warn!("No CLI prompt recognized in the banner from {}", host);
        }
        if banner.trim_end().ends_with('>') {
            if let Some(secret) = connection.secret.as_deref() {
                ssh.enable(secret).map_err(|e| PushError::connect(host, e))?;
            }
        }
        let paging_off = ssh.platform.paging_off;
        ssh.command(paging_off).map_err(|e| PushError::connect(host, e))?;

        Ok(ssh)
    }
}

/// SshSession is an interactive shell on one device
pub struct SshSession {
    session: ssh2::Session,
    channel: ssh2::Channel,
    host: String,
    platform: Platform,
    timeout: Duration,
    /// Base prompt learned from the banner, e.g. `r1` matches `r1#` and `r1(config-if)#`
    prompt: Option<Regex>,
}

impl SshSession {
    fn write_line(&mut self, line: &str) -> Result<(), String> {
        self.channel
            .write_all(format!("{}\n", line).as_bytes())
            .and_then(|_| self.channel.flush())
            .map_err(|e| format!("Failed to write '{}': {}", line, e))
    }

    /// Send one line and collect output up to the next prompt
    fn command(&mut self, line: &str) -> Result<String, String> {
        self.write_line(line)?;
        self.read_until_prompt()
    }

    fn enable(&mut self, secret: &str) -> Result<(), String> {
        let output = self.command("enable")?;
        if output.to_lowercase().contains("password") {
            self.write_line(secret)?;
            let output = self.read_until_prompt()?;
            if !output.trim_end().ends_with('#') {
                return Err("enable secret rejected".to_string());
            }
        }
        Ok(())
    }

    /// Read until the output ends in a CLI prompt, or the session timeout elapses
    fn read_until_prompt(&mut self) -> Result<String, String> {
        let started = Instant::now();
        let mut output = String::new();
        let mut buf = [0u8; 4096];

        loop {
            match self.channel.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if ends_with_prompt(&output, self.prompt.as_ref()) {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if ends_with_prompt(&output, self.prompt.as_ref()) || started.elapsed() >= self.timeout {
                        break;
                    }
                }
                Err(e) => return Err(format!("Failed to read output: {}", e)),
            }
        }

        Ok(output)
    }
}

impl DeviceSession for SshSession {
    fn send_config(&mut self, text: &str) -> Result<String, PushError> {
        let host = self.host.clone();
        let mut output = String::new();

        let enter = self.platform.config_enter;
        output.push_str(&self.command(enter).map_err(|e| PushError::transport(&host, e))?);
        for line in crate::utils::config_lines(text) {
            output.push_str(&self.command(line).map_err(|e| PushError::transport(&host, e))?);
        }
        let exit = self.platform.config_exit;
        output.push_str(&self.command(exit).map_err(|e| PushError::transport(&host, e))?);

        Ok(output)
    }

    fn save_configuration(&mut self) -> Result<String, PushError> {
        let host = self.host.clone();
        let save = self.platform.save_command;
        let mut output = self.command(save).map_err(|e| PushError::save(&host, e))?;

        // copy-style saves ask for a destination name or confirmation
        let trimmed = output.trim_end().to_string();
        if trimmed.ends_with("]?") || trimmed.ends_with("[confirm]") {
            output.push_str(&self.command("").map_err(|e| PushError::save(&host, e))?);
        }

        Ok(output)
    }

    fn disconnect(&mut self) {
        let _ = self.write_line("exit");
        if let Err(e) = self.channel.close() {
            tracing::debug!("Channel close on {} failed: {}", self.host, e);
        }
        if let Err(e) = self.session.disconnect(None, "session closed", None) {
            tracing::warn!("SSH disconnect from {} failed: {}", self.host, e);
        }
    }
}

/// Build a matcher for the device prompt from the last line of the login banner
fn prompt_pattern(banner: &str) -> Option<Regex> {
    let last = banner.trim_end().lines().last()?.trim();
    let stripped = last.trim_end_matches(['#', '>']);
    if stripped.len() == last.len() {
        return None;
    }
    let base = stripped.split('(').next().unwrap_or(stripped).trim();
    if base.is_empty() {
        return None;
    }
    Regex::new(&format!(r"^{}(\([\w./:-]+\))?[#>]$", regex_lite::escape(base))).ok()
}

/// True when output ends in a prompt. With a learned prompt only the device's
/// own prompt line counts, so an echoed `banner motd #` does not end a read.
fn ends_with_prompt(output: &str, prompt: Option<&Regex>) -> bool {
    let trimmed = output.trim_end();
    if trimmed.ends_with("]?")
        || trimmed.ends_with("[confirm]")
        || trimmed.to_lowercase().ends_with("password:")
    {
        return true;
    }

    let last = trimmed.lines().last().unwrap_or("").trim();
    match prompt {
        Some(re) => re.is_match(last),
        None => last.ends_with('#') || last.ends_with('>'),
    }
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// Returns the authenticated Session. Uses the ssh2 crate (libssh2).
/// This is blocking, so call from a spawn_blocking context.
fn ssh_connect(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
    timeout: Duration,
) -> Result<ssh2::Session, String> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("Invalid address {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| format!("No address found for {}:{}", host, port))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| format!("TCP connection failed: {}", e))?;

    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| format!("Failed to create SSH session: {}", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis() as u32);
    session.handshake()
        .map_err(|e| format!("SSH handshake failed: {}", e))?;

    // Try password auth first
    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Try keyboard-interactive auth (needed for Arista EOS and similar)
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err("SSH authentication failed: all methods exhausted".to_string())
    }
}
