//! Integration tests for modlink-modbus, driven by an in-memory transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modlink_common::{AttributeRef, AttributeType, Value};
use modlink_modbus::config::{RegisterSpace, ValueEncoding, WriteSpace, WriteValueEncoding};
use modlink_modbus::dispatch::{ReadDispatcher, WriteDispatcher};
use modlink_modbus::{
    ChannelSink, ConnectionStatus, DeviceConfig, LinkConfig, ModbusError, ModbusProtocol,
    ModbusTransport, TransportError,
};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

/// A transport call as seen by the device.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Close,
    ReadCoils(u8, u16, u16),
    ReadDiscreteInputs(u8, u16, u16),
    ReadHoldingRegisters(u8, u16, u16),
    ReadInputRegisters(u8, u16, u16),
    WriteSingleCoil(u8, u16, bool),
    WriteSingleRegister(u8, u16, u16),
    WriteMultipleRegisters(u8, u16, Vec<u16>),
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<Call>>,
    registers: Mutex<HashMap<u16, u16>>,
    bits: Mutex<HashMap<u16, bool>>,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    failing_reads: AtomicUsize,
    read_latency: Mutex<Duration>,
    read_starts: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-memory device. Clones share state, so a test can keep a handle after
/// handing the transport to a protocol.
#[derive(Clone, Default)]
struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    fn with_register(self, address: u16, word: u16) -> Self {
        self.state.registers.lock().unwrap().insert(address, word);
        self
    }

    fn with_bit(self, address: u16, bit: bool) -> Self {
        self.state.bits.lock().unwrap().insert(address, bit);
        self
    }

    fn refusing_connect(self) -> Self {
        self.state.refuse_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Make every holding register read take `latency`.
    fn with_read_latency(self, latency: Duration) -> Self {
        *self.state.read_latency.lock().unwrap() = latency;
        self
    }

    /// Make the next `count` reads time out.
    fn fail_next_reads(&self, count: usize) {
        self.state.failing_reads.store(count, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    fn reads(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::ReadCoils(..)
                        | Call::ReadDiscreteInputs(..)
                        | Call::ReadHoldingRegisters(..)
                        | Call::ReadInputRegisters(..)
                )
            })
            .collect()
    }

    fn read_starts(&self) -> Vec<Instant> {
        self.state.read_starts.lock().unwrap().clone()
    }

    fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond_after_latency(&self) {
        self.state.read_starts.lock().unwrap().push(Instant::now());
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let latency = *self.state.read_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.state.calls.lock().unwrap().push(call);
    }

    fn read_failure(&self) -> Result<(), TransportError> {
        let failing = &self.state.failing_reads;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Timeout(3000));
        }
        Ok(())
    }

    fn words(&self, address: u16, quantity: u16) -> Vec<u16> {
        let registers = self.state.registers.lock().unwrap();
        (address..address + quantity)
            .map(|a| registers.get(&a).copied().unwrap_or(0))
            .collect()
    }

    fn bits(&self, address: u16, quantity: u16) -> Vec<bool> {
        let bits = self.state.bits.lock().unwrap();
        (address..address + quantity)
            .map(|a| bits.get(&a).copied().unwrap_or(false))
            .collect()
    }
}

impl ModbusTransport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record(Call::Connect);
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io("Connection refused".to_string()));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(Call::Close);
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read_coils(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, TransportError> {
        self.record(Call::ReadCoils(unit_id, address, quantity));
        self.read_failure()?;
        Ok(self.bits(address, quantity))
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, TransportError> {
        self.record(Call::ReadDiscreteInputs(unit_id, address, quantity));
        self.read_failure()?;
        Ok(self.bits(address, quantity))
    }

    async fn read_holding_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.record(Call::ReadHoldingRegisters(unit_id, address, quantity));
        self.respond_after_latency().await;
        self.read_failure()?;
        Ok(self.words(address, quantity))
    }

    async fn read_input_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.record(Call::ReadInputRegisters(unit_id, address, quantity));
        self.read_failure()?;
        Ok(self.words(address, quantity))
    }

    async fn write_single_coil(
        &self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), TransportError> {
        self.record(Call::WriteSingleCoil(unit_id, address, value));
        Ok(())
    }

    async fn write_single_register(
        &self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        self.record(Call::WriteSingleRegister(unit_id, address, value));
        Ok(())
    }

    async fn write_multiple_registers(
        &self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        self.record(Call::WriteMultipleRegisters(
            unit_id,
            address,
            values.to_vec(),
        ));
        Ok(())
    }
}

fn device() -> DeviceConfig {
    DeviceConfig::tcp("plc01", "127.0.0.1", 502)
}

fn meter_power() -> AttributeRef {
    AttributeRef::new("meter", "power")
}

fn holding_int16(address: u16) -> LinkConfig {
    LinkConfig::read(1, RegisterSpace::Holding, address)
        .with_read_encoding(ValueEncoding::Int16)
        .with_refresh_ms(1000)
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_polls_immediately_then_at_fixed_delay() {
    let mock = MockTransport::default().with_register(10, 0xFFFE);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    let started = Instant::now();
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));

    let first = updates.recv().await.unwrap();
    assert_eq!(first.attribute_ref, meter_power());
    assert_eq!(first.value, Value::Integer(-2));
    assert!(started.elapsed() < Duration::from_millis(10));

    let second = updates.recv().await.unwrap();
    assert_eq!(second.value, Value::Integer(-2));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1100), "{:?}", elapsed);

    assert_eq!(
        mock.reads()[..2],
        [
            Call::ReadHoldingRegisters(1, 10, 1),
            Call::ReadHoldingRegisters(1, 10, 1)
        ]
    );

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_does_not_stop_task() {
    let mock = MockTransport::default().with_register(10, 7);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    mock.fail_next_reads(1);
    let started = Instant::now();
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.value, Value::Integer(7));
    assert!(started.elapsed() >= Duration::from_millis(1000));

    let health = protocol.health();
    assert_eq!(health.polls_failed, 1);
    assert_eq!(health.polls_ok, 1);
    assert_eq!(health.status, ConnectionStatus::Connected);
    assert!(protocol.is_linked(&meter_power()));

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unlink_stops_future_polls() {
    let mock = MockTransport::default().with_register(10, 1);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));
    updates.recv().await.unwrap();

    protocol.on_unlink(&meter_power());
    assert!(!protocol.is_linked(&meter_power()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.reads().len(), 1);
    assert!(updates.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_slow_reads_never_overlap() {
    let mock = MockTransport::default()
        .with_register(10, 5)
        .with_read_latency(Duration::from_millis(1500));
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    let started = Instant::now();
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));

    tokio::time::sleep(Duration::from_millis(5200)).await;

    // Next poll starts 1500 ms read + 1000 ms refresh after the previous one
    let offsets: Vec<Duration> = mock
        .read_starts()
        .iter()
        .map(|start| start.duration_since(started))
        .collect();
    assert_eq!(
        offsets,
        vec![
            Duration::ZERO,
            Duration::from_millis(2500),
            Duration::from_millis(5000)
        ]
    );
    assert_eq!(mock.max_in_flight(), 1);

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_link_without_unit_id_uses_device_unit_id() {
    let mock = MockTransport::default().with_register(30, 12);
    let (sink, mut updates) = ChannelSink::new();
    let mut device = device();
    device.unit_id = 5;
    let protocol = ModbusProtocol::new(device, mock.clone(), sink);
    assert_ok!(protocol.start().await);

    let link = LinkConfig::read_device(RegisterSpace::Holding, 30).with_write(
        WriteSpace::Holding,
        31,
        WriteValueEncoding::Int16,
    );
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, link.clone()));
    assert_eq!(updates.recv().await.unwrap().value, Value::Integer(12));

    let ack = protocol
        .on_write(&meter_power(), &link, &Value::Integer(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.unit_id, 5);

    let calls = mock.calls();
    assert!(calls.contains(&Call::ReadHoldingRegisters(5, 30, 1)));
    assert!(calls.contains(&Call::WriteSingleRegister(5, 31, 3)));

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_relink_unlinks_attribute() {
    let mock = MockTransport::default().with_register(10, 1);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));
    updates.recv().await.unwrap();

    let invalid = LinkConfig::read(1, RegisterSpace::Holding, 20).with_refresh_ms(0);
    assert_err!(protocol.on_link(meter_power(), AttributeType::Integer, invalid));
    assert!(!protocol.is_linked(&meter_power()));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(mock.reads(), vec![Call::ReadHoldingRegisters(1, 10, 1)]);

    protocol.stop().await;
}

#[tokio::test]
async fn test_unlink_unknown_attribute_is_noop() {
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), MockTransport::default(), sink);

    protocol.on_unlink(&AttributeRef::new("nobody", "nothing"));
    assert_eq!(protocol.health().linked_attributes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_relink_replaces_task() {
    let mock = MockTransport::default()
        .with_register(10, 1)
        .with_register(20, 2);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(10)));
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, holding_int16(20)));
    assert_eq!(protocol.health().linked_attributes, 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let reads = mock.reads();
    assert!(reads.len() >= 2);
    assert!(
        reads
            .iter()
            .all(|c| *c == Call::ReadHoldingRegisters(1, 20, 1)),
        "{:?}",
        reads
    );
    while let Ok(update) = updates.try_recv() {
        assert_eq!(update.value, Value::Integer(2));
    }

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_value_not_fitting_attribute_type_is_dropped() {
    let mock = MockTransport::default()
        .with_register(0, 0xFFFF)
        .with_register(1, 0xFFFF)
        .with_register(2, 0xFFFF)
        .with_register(3, 0xFFFF);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    let link = LinkConfig::read(1, RegisterSpace::Input, 0)
        .with_read_encoding(ValueEncoding::UInt64)
        .with_refresh_ms(1000);
    assert_ok!(protocol.on_link(meter_power(), AttributeType::Integer, link));

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(mock.reads(), vec![Call::ReadInputRegisters(1, 0, 4)]);
    assert!(updates.try_recv().is_err());
    let health = protocol.health();
    assert_eq!(health.polls_ok, 1);
    assert_eq!(health.updates_dropped, 1);

    protocol.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_coil_link_publishes_boolean() {
    let mock = MockTransport::default().with_bit(3, true);
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    assert_ok!(protocol.start().await);

    let link = LinkConfig::read(2, RegisterSpace::Coil, 3);
    assert_ok!(protocol.on_link(
        AttributeRef::new("pump", "running"),
        AttributeType::Boolean,
        link
    ));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.value, Value::Boolean(true));
    assert_eq!(mock.reads(), vec![Call::ReadCoils(2, 3, 1)]);

    protocol.stop().await;
}

#[tokio::test]
async fn test_link_with_zero_refresh_is_rejected() {
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), MockTransport::default(), sink);

    let link = LinkConfig::read(1, RegisterSpace::Holding, 0).with_refresh_ms(0);
    let result = protocol.on_link(meter_power(), AttributeType::Number, link);

    assert!(matches!(result, Err(ModbusError::Config(_))));
    assert!(!protocol.is_linked(&meter_power()));
}

// ---------------------------------------------------------------------------
// Read dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_read_dispatch_per_space() {
    let mock = MockTransport::default()
        .with_bit(1, true)
        .with_register(2, 0x1234)
        .with_register(3, 0x5678);
    let reader = ReadDispatcher::new(&mock);

    assert_ok!(reader.read(1, RegisterSpace::Coil, 1, 4).await);
    assert_ok!(reader.read(1, RegisterSpace::Discrete, 1, 1).await);
    assert_ok!(reader.read(1, RegisterSpace::Holding, 2, 2).await);
    assert_ok!(reader.read(7, RegisterSpace::Input, 3, 1).await);

    assert_eq!(
        mock.calls(),
        vec![
            Call::ReadCoils(1, 1, 1),
            Call::ReadDiscreteInputs(1, 1, 1),
            Call::ReadHoldingRegisters(1, 2, 2),
            Call::ReadInputRegisters(7, 3, 1),
        ]
    );
}

#[tokio::test]
async fn test_read_transport_error_propagates() {
    let mock = MockTransport::default();
    mock.fail_next_reads(1);

    let result = ReadDispatcher::new(&mock)
        .read(1, RegisterSpace::Holding, 0, 1)
        .await;

    assert!(matches!(
        result,
        Err(ModbusError::Transport(TransportError::Timeout(_)))
    ));
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_write_holding_register() {
    let mock = MockTransport::default();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);

    let link = LinkConfig::read(1, RegisterSpace::Holding, 20).with_write(
        WriteSpace::Holding,
        20,
        WriteValueEncoding::Int16,
    );
    let ack = protocol
        .on_write(&meter_power(), &link, &Value::Integer(42))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ack.address, 20);
    assert_eq!(ack.words, vec![42]);
    assert_eq!(mock.calls(), vec![Call::WriteSingleRegister(1, 20, 42)]);
    assert_eq!(protocol.health().writes_ok, 1);
}

#[tokio::test]
async fn test_write_coil_zero_is_off() {
    let mock = MockTransport::default();
    let writer = WriteDispatcher::new(&mock);

    assert_ok!(
        writer
            .write(1, RegisterSpace::Coil, 5, WriteValueEncoding::Int16, &Value::Integer(0))
            .await
    );
    assert_ok!(
        writer
            .write(1, RegisterSpace::Coil, 5, WriteValueEncoding::Int16, &Value::Number(0.0))
            .await
    );
    assert_ok!(
        writer
            .write(1, RegisterSpace::Coil, 6, WriteValueEncoding::Int16, &Value::Integer(3))
            .await
    );

    assert_eq!(
        mock.calls(),
        vec![
            Call::WriteSingleCoil(1, 5, false),
            Call::WriteSingleCoil(1, 5, false),
            Call::WriteSingleCoil(1, 6, true),
        ]
    );
}

#[tokio::test]
async fn test_write_read_only_space_is_unsupported() {
    let mock = MockTransport::default();
    let writer = WriteDispatcher::new(&mock);

    for space in [RegisterSpace::Discrete, RegisterSpace::Input] {
        let result = writer
            .write(1, space, 0, WriteValueEncoding::Int16, &Value::Integer(1))
            .await;
        assert!(matches!(result, Err(ModbusError::UnsupportedOperation(_))));
    }
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_write_non_numeric_to_holding_is_rejected() {
    let mock = MockTransport::default();
    let writer = WriteDispatcher::new(&mock);

    let result = writer
        .write(
            1,
            RegisterSpace::Holding,
            0,
            WriteValueEncoding::Int16,
            &Value::from("on"),
        )
        .await;
    assert!(matches!(result, Err(ModbusError::InvalidArgument(_))));

    let result = writer
        .write(
            1,
            RegisterSpace::Holding,
            0,
            WriteValueEncoding::Int16,
            &Value::Integer(70_000),
        )
        .await;
    assert!(matches!(result, Err(ModbusError::InvalidArgument(_))));

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_write_wide_encodings_use_multiple_registers() {
    let mock = MockTransport::default();
    let writer = WriteDispatcher::new(&mock);

    assert_ok!(
        writer
            .write(
                1,
                RegisterSpace::Holding,
                100,
                WriteValueEncoding::Int32,
                &Value::Integer(0x0001_0002),
            )
            .await
    );
    assert_ok!(
        writer
            .write(
                1,
                RegisterSpace::Holding,
                200,
                WriteValueEncoding::Int32Swap,
                &Value::Integer(0x0001_0002),
            )
            .await
    );

    assert_eq!(
        mock.calls(),
        vec![
            Call::WriteMultipleRegisters(1, 100, vec![0x0001, 0x0002]),
            Call::WriteMultipleRegisters(1, 200, vec![0x0002, 0x0001]),
        ]
    );
}

#[tokio::test]
async fn test_write_without_write_space_is_dropped() {
    let mock = MockTransport::default();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);

    let link = LinkConfig::read(1, RegisterSpace::Holding, 20);
    let result = protocol
        .on_write(&meter_power(), &link, &Value::Integer(1))
        .await;

    assert!(matches!(result, Ok(None)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_failed_write_is_counted() {
    let mock = MockTransport::default();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock, sink);

    let link = LinkConfig::read(1, RegisterSpace::Holding, 20).with_write(
        WriteSpace::Holding,
        20,
        WriteValueEncoding::Int16,
    );
    assert_err!(
        protocol
            .on_write(&meter_power(), &link, &Value::from("high"))
            .await
    );
    assert_eq!(protocol.health().writes_failed, 1);
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_and_stop() {
    let mock = MockTransport::default();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);
    let mut status = protocol.subscribe_status();

    assert_eq!(protocol.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        protocol.start().await.unwrap(),
        ConnectionStatus::Connected
    );
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);

    protocol.stop().await;
    protocol.stop().await;
    assert_eq!(protocol.status(), ConnectionStatus::Disconnected);
    assert_eq!(mock.calls(), vec![Call::Connect, Call::Close]);
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let mock = MockTransport::default();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock.clone(), sink);

    protocol.stop().await;
    protocol.stop().await;

    assert_eq!(protocol.status(), ConnectionStatus::Disconnected);
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_connect_failure_sets_error_status() {
    let mock = MockTransport::default().refusing_connect();
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), mock, sink);

    let result = protocol.start().await;

    assert!(matches!(result, Err(ModbusError::Connection(_))));
    assert_eq!(protocol.status(), ConnectionStatus::Error);
    assert_eq!(protocol.health().status, ConnectionStatus::Error);
}

#[test]
fn test_protocol_identity() {
    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::new(device(), MockTransport::default(), sink);

    assert_eq!(protocol.protocol_name(), "Modbus TCP Client");
    assert_eq!(protocol.instance_uri(), "modbus-tcp://127.0.0.1:502");
}
