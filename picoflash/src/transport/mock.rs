//! In-memory bootloader emulator for tests.
//!
//! `MockTransport` answers the PICOBOOT handshake the way the boot ROM does:
//! it decodes command frames, walks through the data and status phases and
//! keeps a sparse flash image so erase, write and read behave realistically.
//! Every transport call is logged so tests can assert on exact traffic.

use {
    crate::{
        error::{Error, Result, TransportError},
        protocol::{CommandFrame, CommandId, FRAME_SIZE},
        transport::{
            AlternateSetting, ControlRequest, DeviceConfiguration, EndpointInfo, InterfaceInfo,
            TransferType, Transport, VENDOR_SPECIFIC_CLASS,
        },
    },
    byteorder::{ByteOrder, LittleEndian},
    std::collections::{BTreeMap, HashMap},
};

/// Bulk OUT endpoint of the emulated bootloader interface.
pub(crate) const MOCK_OUT_EP: u8 = 0x03;
/// Bulk IN endpoint of the emulated bootloader interface.
pub(crate) const MOCK_IN_EP: u8 = 0x84;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Open,
    Close,
    Claim(u8),
    Control(ControlRequest),
    BulkWrite { endpoint: u8, data: Vec<u8> },
    BulkRead { endpoint: u8, length: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    DataOut(CommandFrame),
    DataIn(CommandFrame),
    Ack,
    Status,
}

pub(crate) struct MockTransport {
    config: DeviceConfiguration,
    pub events: Vec<Event>,
    pub frames: Vec<CommandFrame>,
    /// Programmed bytes; absent addresses read as erased (0xFF).
    memory: BTreeMap<u32, u8>,
    phase: Phase,
    opened: bool,
    counts: HashMap<CommandId, usize>,
    fail_on: Option<(CommandId, usize, TransportError)>,
    fail_open: Option<TransportError>,
    fail_claim: Option<TransportError>,
    /// Bytes returned in each status phase.
    pub status_len: usize,
    /// Bytes dropped from every IN data phase.
    pub short_read_by: usize,
    /// Bytes dropped from every OUT data phase write.
    pub short_write_by: usize,
    /// XOR applied to the first byte of every READ response.
    pub corrupt_reads: u8,
    pub rebooted: Option<(u32, u32, u32)>,
}

impl MockTransport {
    /// Emulate a BOOTSEL RP2040: mass storage on interface 0, PICOBOOT on 1.
    pub fn picoboot() -> Self {
        let msd = InterfaceInfo {
            number: 0,
            alternates: vec![AlternateSetting {
                setting: 0,
                class_code: 0x08,
                endpoints: vec![bulk(0x01), bulk(0x82)],
            }],
        };
        let vendor = InterfaceInfo {
            number: 1,
            alternates: vec![AlternateSetting {
                setting: 0,
                class_code: VENDOR_SPECIFIC_CLASS,
                endpoints: vec![bulk(MOCK_OUT_EP), bulk(MOCK_IN_EP)],
            }],
        };
        Self::with_config(DeviceConfiguration {
            interfaces: vec![msd, vendor],
        })
    }

    pub fn with_config(config: DeviceConfiguration) -> Self {
        Self {
            config,
            events: Vec::new(),
            frames: Vec::new(),
            memory: BTreeMap::new(),
            phase: Phase::Idle,
            opened: false,
            counts: HashMap::new(),
            fail_on: None,
            fail_open: None,
            fail_claim: None,
            status_len: 1,
            short_read_by: 0,
            short_write_by: 0,
            corrupt_reads: 0,
            rebooted: None,
        }
    }

    pub fn config_for_test(&self) -> DeviceConfiguration {
        self.config.clone()
    }

    /// Fail the `nth` (1-based) frame write of `command` with `err`.
    pub fn fail_command(mut self, command: CommandId, nth: usize, err: TransportError) -> Self {
        self.fail_on = Some((command, nth, err));
        self
    }

    pub fn fail_open(mut self, err: TransportError) -> Self {
        self.fail_open = Some(err);
        self
    }

    pub fn fail_claim(mut self, err: TransportError) -> Self {
        self.fail_claim = Some(err);
        self
    }

    /// Command ids of every frame received, in order.
    pub fn commands(&self) -> Vec<CommandId> {
        self.frames.iter().map(CommandFrame::command).collect()
    }

    /// Bulk writes that carried data phase payloads, in order.
    pub fn data_writes(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::BulkWrite { data, .. } if data.len() > 1 && data.len() != FRAME_SIZE => {
                    Some(data.clone())
                },
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> bool {
        self.events.contains(&Event::Close)
    }

    pub fn read_memory(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let a = addr + u32::try_from(i).unwrap_or(u32::MAX);
                self.memory.get(&a).copied().unwrap_or(0xFF)
            })
            .collect()
    }

    pub fn preload(&mut self, addr: u32, data: &[u8]) {
        for (a, b) in (addr..).zip(data) {
            self.memory.insert(a, *b);
        }
    }

    fn protocol_violation(&self, what: &str) -> Error {
        Error::Transport(TransportError::Usb(format!(
            "mock: unexpected {what} in phase {:?}",
            self.phase
        )))
    }

    fn args(frame: &CommandFrame) -> (u32, u32, u32) {
        let mut words = [0u32; 3];
        let inline = frame.inline_payload();
        for (i, w) in words.iter_mut().enumerate() {
            if inline.len() >= (i + 1) * 4 {
                *w = LittleEndian::read_u32(&inline[i * 4..i * 4 + 4]);
            }
        }
        (words[0], words[1], words[2])
    }

    fn accept_frame(&mut self, data: &[u8]) -> Result<usize> {
        let frame = CommandFrame::decode(data)?;
        let command = frame.command();

        let count = self.counts.entry(command).or_insert(0);
        *count += 1;
        if let Some((cmd, nth, err)) = &self.fail_on {
            if *cmd == command && *nth == *count {
                return Err(Error::Transport(err.clone()));
            }
        }

        let (a0, a1, a2) = Self::args(&frame);
        match command {
            CommandId::FlashErase => {
                let keys: Vec<u32> = self.memory.range(a0..a0 + a1).map(|(k, _)| *k).collect();
                for k in keys {
                    self.memory.remove(&k);
                }
            },
            CommandId::Reboot => self.rebooted = Some((a0, a1, a2)),
            _ => {},
        }

        self.phase = if command.is_device_to_host() {
            Phase::DataIn(frame.clone())
        } else if frame.transfer_length() > 0 {
            Phase::DataOut(frame.clone())
        } else {
            Phase::Status
        };
        self.frames.push(frame);
        Ok(data.len())
    }
}

fn bulk(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer_type: TransferType::Bulk,
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<DeviceConfiguration> {
        self.events.push(Event::Open);
        if let Some(err) = self.fail_open.clone() {
            return Err(err.into());
        }
        self.opened = true;
        Ok(self.config.clone())
    }

    fn close(&mut self) -> Result<()> {
        self.events.push(Event::Close);
        self.opened = false;
        Ok(())
    }

    fn claim_interface(&mut self, number: u8) -> Result<()> {
        self.events.push(Event::Claim(number));
        if let Some(err) = self.fail_claim.clone() {
            return Err(err.into());
        }
        Ok(())
    }

    fn control_transfer_out(&mut self, request: ControlRequest) -> Result<()> {
        self.events.push(Event::Control(request));
        self.phase = Phase::Idle;
        Ok(())
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize> {
        self.events.push(Event::BulkWrite {
            endpoint,
            data: data.to_vec(),
        });
        if !self.opened {
            return Err(TransportError::NotOpen.into());
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => self.accept_frame(data),
            Phase::DataOut(frame) => {
                let (addr, _, _) = Self::args(&frame);
                if frame.command() == CommandId::Write {
                    self.preload(addr, data);
                }
                self.phase = Phase::Status;
                Ok(data.len().saturating_sub(self.short_write_by))
            },
            Phase::Ack if data == [0] => Ok(1),
            other => {
                self.phase = other;
                Err(self.protocol_violation("bulk write"))
            },
        }
    }

    fn bulk_read(&mut self, endpoint: u8, length: usize) -> Result<Vec<u8>> {
        self.events.push(Event::BulkRead { endpoint, length });
        if !self.opened {
            return Err(TransportError::NotOpen.into());
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::DataIn(frame) => {
                let (addr, size, _) = Self::args(&frame);
                let mut data = self.read_memory(addr, size as usize);
                if let Some(first) = data.first_mut() {
                    *first ^= self.corrupt_reads;
                }
                data.truncate(length.min(data.len()).saturating_sub(self.short_read_by));
                self.phase = Phase::Ack;
                Ok(data)
            },
            Phase::Status => Ok(vec![0; self.status_len]),
            other => {
                self.phase = other;
                Err(self.protocol_violation("bulk read"))
            },
        }
    }
}
