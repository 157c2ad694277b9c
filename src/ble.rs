// FaceCube — BLE Link
//
// GATT server exposing the cube service plus the standard Battery Service.
//
// Cube service characteristics:
//   event  — read + notify, 6-byte event packets (generic, append-style)
//   face   — read + notify, 6-byte event packets (latest face switch only)
//   config — write, 4-byte face color packets
//
// The BT stack runs callbacks on its own task.  This module keeps only
// link-local state (handles, connection, CCCD subscriptions) behind a
// mutex; everything that touches core state is forwarded to the cube task
// as a LinkEvent.  Attribute tables are built event-driven: each added
// characteristic/descriptor chains the next one from its completion event.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use enumset::enum_set;

use esp_idf_hal::modem::Modem;

use esp_idf_svc::bt::ble::gap::{AdvConfiguration, BleGapEvent, EspBleGap};
use esp_idf_svc::bt::ble::gatt::server::{ConnectionId, EspGatts, GattsEvent};
use esp_idf_svc::bt::ble::gatt::{
    AutoResponse, GattCharacteristic, GattDescriptor, GattId, GattInterface, GattServiceId,
    GattStatus, Handle, Permission, Property,
};
use esp_idf_svc::bt::{Ble, BtDriver, BtUuid};
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use crate::config::BLE_DEVICE_NAME;
use crate::dispatch::EventLink;
use crate::events::LinkEvent;
use crate::protocol::EventPacket;

// Cube service (vendor namespace, shared with the desktop client)
const CUBE_SERVICE_UUID: u128 = 0x6e400001_8a3a_11e5_8994_feff819cdc9f;
const EVENT_CHAR_UUID: u128 = 0x6e400002_8a3a_11e5_8994_feff819cdc9f;
const CONFIG_CHAR_UUID: u128 = 0x6e400003_8a3a_11e5_8994_feff819cdc9f;
const FACE_CHAR_UUID: u128 = 0x6e400004_8a3a_11e5_8994_feff819cdc9f;

// Bluetooth SIG assigned numbers
const BATTERY_SERVICE_UUID: u16 = 0x180f;
const BATTERY_LEVEL_CHAR_UUID: u16 = 0x2a19;
const CCCD_UUID: u16 = 0x2902;

const APP_ID: u16 = 0;
const CUBE_SERVICE_HANDLES: u16 = 12;
const BATTERY_SERVICE_HANDLES: u16 = 6;

type CubeBtDriver = BtDriver<'static, Ble>;
type CubeBleGap = EspBleGap<'static, Ble, Arc<CubeBtDriver>>;
type CubeGatts = EspGatts<'static, Ble, Arc<CubeBtDriver>>;

/// Which characteristic the in-flight CCCD add belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingCccd {
    Event,
    Face,
    Battery,
}

#[derive(Default)]
struct LinkState {
    gatt_if: Option<GattInterface>,

    event_char: Option<Handle>,
    event_cccd: Option<Handle>,
    face_char: Option<Handle>,
    face_cccd: Option<Handle>,
    config_char: Option<Handle>,
    battery_char: Option<Handle>,
    battery_cccd: Option<Handle>,
    pending_cccd: Option<PendingCccd>,

    conn_id: Option<ConnectionId>,
    event_notify: bool,
    face_notify: bool,
    battery_notify: bool,
    battery_level: u8,
}

pub struct BleLink {
    gap: CubeBleGap,
    gatts: CubeGatts,
    state: Mutex<LinkState>,
    link_tx: Sender<LinkEvent>,
}

impl BleLink {
    /// Bring up the controller, register the GATT application and start
    /// advertising.  Returns once the stack is running; attribute creation
    /// continues asynchronously on the BT task.
    pub fn start(
        modem: Modem,
        nvs: EspDefaultNvsPartition,
        link_tx: Sender<LinkEvent>,
    ) -> anyhow::Result<Arc<Self>> {
        log::info!("BLE: init start");

        let driver = Arc::new(BtDriver::new(modem, Some(nvs))?);
        let link = Arc::new(Self {
            gap: EspBleGap::new(driver.clone())?,
            gatts: EspGatts::new(driver)?,
            state: Mutex::new(LinkState::default()),
            link_tx,
        });

        let gap_link = link.clone();
        link.gap.subscribe(move |event| {
            if let Err(e) = gap_link.on_gap_event(event) {
                log::warn!("BLE: gap event error: {}", e);
            }
        })?;

        let gatts_link = link.clone();
        link.gatts.subscribe(move |(gatt_if, event)| {
            if let Err(e) = gatts_link.on_gatts_event(gatt_if, event) {
                log::warn!("BLE: gatts event error: {}", e);
            }
        })?;

        link.gatts.register_app(APP_ID)?;
        log::info!("BLE: app registered, building attribute table");
        Ok(link)
    }

    // -- GAP ----------------------------------------------------------------

    fn on_gap_event(&self, event: BleGapEvent) -> anyhow::Result<()> {
        if let BleGapEvent::AdvertisingConfigured(status) = event {
            if status == esp_idf_svc::bt::BtStatus::Success {
                self.gap.start_advertising()?;
                log::info!("BLE: advertising as '{}'", BLE_DEVICE_NAME);
            } else {
                log::warn!("BLE: advertising configuration failed: {:?}", status);
            }
        }
        Ok(())
    }

    // -- GATTS --------------------------------------------------------------

    fn on_gatts_event(&self, gatt_if: GattInterface, event: GattsEvent) -> anyhow::Result<()> {
        match event {
            GattsEvent::ServiceRegistered { status, app_id } => {
                if status != GattStatus::Ok || app_id != APP_ID {
                    anyhow::bail!("service registration failed: {:?}", status);
                }
                self.state.lock().unwrap().gatt_if = Some(gatt_if);

                self.gap.set_device_name(BLE_DEVICE_NAME)?;
                self.gap.set_adv_conf(&AdvConfiguration {
                    include_name: true,
                    include_txpower: true,
                    flag: 2,
                    service_uuid: Some(BtUuid::uuid128(CUBE_SERVICE_UUID)),
                    ..Default::default()
                })?;

                self.gatts.create_service(
                    gatt_if,
                    &GattServiceId {
                        id: GattId {
                            uuid: BtUuid::uuid128(CUBE_SERVICE_UUID),
                            inst_id: 0,
                        },
                        is_primary: true,
                    },
                    CUBE_SERVICE_HANDLES,
                )?;
            }

            GattsEvent::ServiceCreated {
                status,
                service_handle,
                service_id,
            } => {
                if status != GattStatus::Ok {
                    anyhow::bail!("service creation failed: {:?}", status);
                }
                self.gatts.start_service(service_handle)?;

                if service_id.id.uuid == BtUuid::uuid128(CUBE_SERVICE_UUID) {
                    // First characteristic; the rest chain from completion
                    // events below.
                    self.add_packet_characteristic(service_handle, EVENT_CHAR_UUID)?;
                } else {
                    self.gatts.add_characteristic(
                        service_handle,
                        &GattCharacteristic::new(
                            BtUuid::uuid16(BATTERY_LEVEL_CHAR_UUID),
                            enum_set!(Permission::Read),
                            enum_set!(Property::Read | Property::Notify),
                            1,
                            AutoResponse::ByGatt,
                        ),
                        &[100],
                    )?;
                }
            }

            GattsEvent::CharacteristicAdded {
                status,
                attr_handle,
                service_handle,
                char_uuid,
            } => {
                if status != GattStatus::Ok {
                    anyhow::bail!("characteristic add failed: {:?}", status);
                }
                self.on_characteristic_added(attr_handle, service_handle, char_uuid)?;
            }

            GattsEvent::DescriptorAdded {
                status,
                attr_handle,
                service_handle,
                descr_uuid,
            } => {
                if status != GattStatus::Ok {
                    anyhow::bail!("descriptor add failed: {:?}", status);
                }
                if descr_uuid == BtUuid::uuid16(CCCD_UUID) {
                    self.on_cccd_added(attr_handle, service_handle)?;
                }
            }

            GattsEvent::ServiceStarted { status, .. } => {
                if status != GattStatus::Ok {
                    log::warn!("BLE: service start failed: {:?}", status);
                }
            }

            GattsEvent::PeerConnected { conn_id, addr, .. } => {
                log::info!("BLE: client connected: {:?}", addr);
                {
                    let mut state = self.state.lock().unwrap();
                    state.conn_id = Some(conn_id);
                    state.event_notify = false;
                    state.face_notify = false;
                    state.battery_notify = false;
                }
                let _ = self.link_tx.send(LinkEvent::Connected);
            }

            GattsEvent::PeerDisconnected { addr, .. } => {
                log::info!("BLE: client disconnected: {:?}", addr);
                {
                    let mut state = self.state.lock().unwrap();
                    state.conn_id = None;
                    state.event_notify = false;
                    state.face_notify = false;
                    state.battery_notify = false;
                }
                let _ = self.link_tx.send(LinkEvent::Disconnected);
                self.gap.start_advertising()?;
            }

            GattsEvent::Write {
                conn_id,
                trans_id,
                handle,
                offset,
                need_rsp,
                is_prep,
                value,
                ..
            } => {
                // Prepared/long writes are not part of this protocol (both
                // inbound packets fit in a single ATT write).
                if !is_prep && offset == 0 {
                    self.on_write(handle, &value);
                }
                if need_rsp {
                    let gatt_if = self
                        .state
                        .lock()
                        .unwrap()
                        .gatt_if
                        .ok_or_else(|| anyhow::anyhow!("write before registration"))?;
                    self.gatts
                        .send_response(gatt_if, conn_id, trans_id, GattStatus::Ok, None)?;
                }
            }

            _ => (),
        }

        Ok(())
    }

    /// read + notify characteristic holding one 6-byte event packet.
    fn add_packet_characteristic(&self, service: Handle, uuid: u128) -> anyhow::Result<()> {
        self.gatts.add_characteristic(
            service,
            &GattCharacteristic::new(
                BtUuid::uuid128(uuid),
                enum_set!(Permission::Read),
                enum_set!(Property::Read | Property::Notify),
                crate::protocol::PACKET_SIZE,
                AutoResponse::ByGatt,
            ),
            &[0; crate::protocol::PACKET_SIZE],
        )?;
        Ok(())
    }

    fn on_characteristic_added(
        &self,
        attr_handle: Handle,
        service_handle: Handle,
        char_uuid: BtUuid,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();

        if char_uuid == BtUuid::uuid128(EVENT_CHAR_UUID) {
            state.event_char = Some(attr_handle);
            state.pending_cccd = Some(PendingCccd::Event);
        } else if char_uuid == BtUuid::uuid128(FACE_CHAR_UUID) {
            state.face_char = Some(attr_handle);
            state.pending_cccd = Some(PendingCccd::Face);
        } else if char_uuid == BtUuid::uuid16(BATTERY_LEVEL_CHAR_UUID) {
            state.battery_char = Some(attr_handle);
            state.pending_cccd = Some(PendingCccd::Battery);
        } else if char_uuid == BtUuid::uuid128(CONFIG_CHAR_UUID) {
            state.config_char = Some(attr_handle);
            // Cube service complete — bring up the battery service.
            let gatt_if = state
                .gatt_if
                .ok_or_else(|| anyhow::anyhow!("characteristic before registration"))?;
            drop(state);
            self.gatts.create_service(
                gatt_if,
                &GattServiceId {
                    id: GattId {
                        uuid: BtUuid::uuid16(BATTERY_SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                },
                BATTERY_SERVICE_HANDLES,
            )?;
            return Ok(());
        } else {
            log::warn!("BLE: unexpected characteristic {:?}", char_uuid);
            return Ok(());
        }

        // The three notify characteristics all need a client config
        // descriptor before anything else is added.
        drop(state);
        self.gatts.add_descriptor(
            service_handle,
            &GattDescriptor::new(
                BtUuid::uuid16(CCCD_UUID),
                enum_set!(Permission::Read | Permission::Write),
            ),
        )?;
        Ok(())
    }

    fn on_cccd_added(&self, attr_handle: Handle, service_handle: Handle) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.pending_cccd.take() {
            Some(PendingCccd::Event) => {
                state.event_cccd = Some(attr_handle);
                drop(state);
                self.add_packet_characteristic(service_handle, FACE_CHAR_UUID)?;
            }
            Some(PendingCccd::Face) => {
                state.face_cccd = Some(attr_handle);
                drop(state);
                self.gatts.add_characteristic(
                    service_handle,
                    &GattCharacteristic::new(
                        BtUuid::uuid128(CONFIG_CHAR_UUID),
                        enum_set!(Permission::Write),
                        enum_set!(Property::Write),
                        crate::protocol::FACE_CONFIG_SIZE,
                        AutoResponse::ByApp,
                    ),
                    &[],
                )?;
            }
            Some(PendingCccd::Battery) => {
                state.battery_cccd = Some(attr_handle);
                log::info!("BLE: attribute table complete");
            }
            None => log::warn!("BLE: unexpected descriptor 0x{:x}", attr_handle),
        }
        Ok(())
    }

    fn on_write(&self, handle: Handle, value: &[u8]) {
        let mut state = self.state.lock().unwrap();

        // CCCD writes flip the matching subscription flag.
        let subscribed = value.first().map(|b| b & 0x01 != 0).unwrap_or(false);
        if Some(handle) == state.event_cccd {
            state.event_notify = subscribed;
            log::info!("BLE: event notifications {}", on_off(subscribed));
        } else if Some(handle) == state.face_cccd {
            state.face_notify = subscribed;
            log::info!("BLE: face notifications {}", on_off(subscribed));
        } else if Some(handle) == state.battery_cccd {
            state.battery_notify = subscribed;
            log::info!("BLE: battery notifications {}", on_off(subscribed));
        } else if Some(handle) == state.config_char {
            let _ = self.link_tx.send(LinkEvent::ColorConfig(value.to_vec()));
        }
    }

    /// Update the characteristic value (so late-connecting clients can read
    /// the most recent packet) and notify when a peer is subscribed.
    fn push_packet(&self, char_handle: Option<Handle>, subscribed: bool, data: &[u8]) -> bool {
        let handle = match char_handle {
            Some(h) => h,
            None => return false,
        };
        let conn = {
            let state = self.state.lock().unwrap();
            state.gatt_if.zip(state.conn_id)
        };

        if let Err(e) = self.gatts.set_attr(handle, data) {
            log::warn!("BLE: set_attr failed: {}", e);
        }

        let (gatt_if, conn_id) = match conn {
            Some(c) if subscribed => c,
            _ => return false,
        };
        match self.gatts.notify(gatt_if, conn_id, handle, data) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("BLE: notify failed: {}", e);
                false
            }
        }
    }
}

impl EventLink for Arc<BleLink> {
    fn notify_face(&self, packet: &EventPacket) -> bool {
        let (handle, subscribed) = {
            let state = self.state.lock().unwrap();
            (state.face_char, state.face_notify)
        };
        self.push_packet(handle, subscribed, &packet.encode())
    }

    fn notify_event(&self, packet: &EventPacket) -> bool {
        let (handle, subscribed) = {
            let state = self.state.lock().unwrap();
            (state.event_char, state.event_notify)
        };
        self.push_packet(handle, subscribed, &packet.encode())
    }

    fn set_battery_level(&self, pct: u8) {
        let (handle, subscribed, changed) = {
            let mut state = self.state.lock().unwrap();
            let changed = state.battery_level != pct;
            state.battery_level = pct;
            (state.battery_char, state.battery_notify, changed)
        };
        if changed {
            self.push_packet(handle, subscribed, &[pct]);
        }
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}
