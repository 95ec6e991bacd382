use std::io::{self, Read, Write};

use anyhow::Result;
use core::time::Duration;
use log::debug;
use serialport::{self, SerialPort, SerialPortType};
use thiserror::Error;

use crate::protocol::Transport;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no pendulum compatible ports found")]
    NoCompatiblePort,
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0483, 0x374B), // ST-Link V2-1 virtual COM port
    UsbId(0x0483, 0x5740), // STMicroelectronics Virtual COM Port
    UsbId(0x0403, 0x6001), // FTDI FT232R USB-UART adapter
];

pub fn open_port(port_name: &str, baudrate: u32) -> Result<Box<dyn SerialPort>> {
    let true_name: String = if port_name == "auto" {
        guess_port()?
    } else {
        port_name.to_string()
    };

    let mut port = serialport::new(&true_name, baudrate).open_native()?;
    port.set_timeout(Duration::from_millis(10))?;

    debug!("open_port OK: {} @ {} baud", &true_name, baudrate);
    Ok(Box::new(port))
}

fn guess_port() -> Result<String> {
    serialport::available_ports()?
        .into_iter()
        .filter(|info| match &info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid))
            }
            _ => false,
        })
        .map(|info| info.port_name)
        .next()
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}

// A read that runs into the port timeout with nothing buffered counts as a
// zero-byte read; the protocol's retry loop owns all timing policy.
impl Transport for Box<dyn SerialPort> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}
