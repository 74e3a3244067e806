//! Parameter-message handlers for [`PixelOutput`].
//!
//! Dispatch is a table from parameter id to an optional getter/setter
//! pair. Unknown ids answer `unknown pid`; a known id hit with the wrong
//! command class answers `unsupported command class`. Handlers validate
//! their payloads with the `pack` helpers, so malformed data comes back
//! as `format error` and bad values as `data out of range`.

use strand_proto::pack;
use strand_proto::param::{pid, CommandClass, NackReason, ParamRequest, ParamResponse};
use strand_proto::sensor::SENSOR_RECORDED_SUPPORT;

use super::PixelOutput;

const RDM_PROTOCOL_VERSION: u16 = 0x0100;
const DEVICE_MODEL_ID: u16 = 0x0452;
const PRODUCT_CATEGORY_FIXTURE: u16 = 0x0101;
const PRODUCT_DETAIL_LED: u16 = 0x0004;
// Bump whenever the personality table changes shape.
const SOFTWARE_VERSION_ID: u32 = 5;

const DEVICE_MODEL_DESCRIPTION: &str = "Strand LED Device";
const MANUFACTURER_LABEL: &str = "Strand Project";

const ALL_SENSORS: u8 = 0xFF;

type Handler = fn(&mut PixelOutput, &ParamRequest) -> ParamResponse;

struct ParamHandlerEntry {
    pid: u16,
    get: Option<Handler>,
    set: Option<Handler>,
}

const PARAM_HANDLERS: &[ParamHandlerEntry] = &[
    ParamHandlerEntry {
        pid: pid::DEVICE_INFO,
        get: Some(get_device_info),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::PRODUCT_DETAIL_ID_LIST,
        get: Some(get_product_detail_list),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DEVICE_MODEL_DESCRIPTION,
        get: Some(get_device_model_description),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::MANUFACTURER_LABEL,
        get: Some(get_manufacturer_label),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DEVICE_LABEL,
        get: Some(get_device_label),
        set: Some(set_device_label),
    },
    ParamHandlerEntry {
        pid: pid::SOFTWARE_VERSION_LABEL,
        get: Some(get_software_version_label),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DMX_PERSONALITY,
        get: Some(get_personality),
        set: Some(set_personality),
    },
    ParamHandlerEntry {
        pid: pid::DMX_PERSONALITY_DESCRIPTION,
        get: Some(get_personality_description),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::SLOT_INFO,
        get: Some(get_slot_info),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DMX_START_ADDRESS,
        get: Some(get_start_address),
        set: Some(set_start_address),
    },
    ParamHandlerEntry {
        pid: pid::IDENTIFY_DEVICE,
        get: Some(get_identify),
        set: Some(set_identify),
    },
    ParamHandlerEntry {
        pid: pid::SENSOR_DEFINITION,
        get: Some(get_sensor_definition),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::SENSOR_VALUE,
        get: Some(get_sensor_value),
        set: Some(set_sensor_value),
    },
    ParamHandlerEntry {
        pid: pid::RECORD_SENSORS,
        get: None,
        set: Some(record_sensors),
    },
    ParamHandlerEntry {
        pid: pid::LIST_INTERFACES,
        get: Some(get_list_interfaces),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::INTERFACE_LABEL,
        get: Some(get_interface_label),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::INTERFACE_HARDWARE_ADDRESS_TYPE1,
        get: Some(get_interface_hardware_address),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::IPV4_CURRENT_ADDRESS,
        get: Some(get_ipv4_current_address),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::IPV4_DEFAULT_ROUTE,
        get: Some(get_ipv4_default_route),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DNS_HOSTNAME,
        get: Some(get_dns_hostname),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DNS_DOMAIN_NAME,
        get: Some(get_dns_domain_name),
        set: None,
    },
    ParamHandlerEntry {
        pid: pid::DNS_IPV4_NAME_SERVER,
        get: Some(get_dns_name_server),
        set: None,
    },
];

pub(super) fn dispatch(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let Some(entry) = PARAM_HANDLERS.iter().find(|e| e.pid == request.pid) else {
        return ParamResponse::Nack(NackReason::UnknownPid);
    };
    let handler = match request.command_class {
        CommandClass::Get => entry.get,
        CommandClass::Set => entry.set,
    };
    match handler {
        Some(handler) => handler(output, request),
        None => ParamResponse::Nack(NackReason::UnsupportedCommandClass),
    }
}

fn get_device_info(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let footprint = output.personalities.active_footprint();
    let mut out = Vec::with_capacity(19);
    pack::put_u16(&mut out, RDM_PROTOCOL_VERSION);
    pack::put_u16(&mut out, DEVICE_MODEL_ID);
    pack::put_u16(&mut out, PRODUCT_CATEGORY_FIXTURE);
    pack::put_u32(&mut out, SOFTWARE_VERSION_ID);
    pack::put_u16(&mut out, footprint);
    out.push(output.personalities.active_number());
    out.push(output.personalities.count());
    pack::put_u16(
        &mut out,
        if footprint == 0 {
            0xFFFF
        } else {
            output.start_address
        },
    );
    pack::put_u16(&mut out, 0); // sub-device count
    out.push(output.sensor_count());
    ParamResponse::Ack(out)
}

fn get_product_detail_list(_output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let mut out = Vec::with_capacity(2);
    pack::put_u16(&mut out, PRODUCT_DETAIL_LED);
    ParamResponse::Ack(out)
}

fn get_device_model_description(
    _output: &mut PixelOutput,
    request: &ParamRequest,
) -> ParamResponse {
    label_response(request, DEVICE_MODEL_DESCRIPTION)
}

fn get_manufacturer_label(_output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    label_response(request, MANUFACTURER_LABEL)
}

fn get_device_label(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let label = output.device_label.clone();
    label_response(request, &label)
}

fn set_device_label(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    match pack::take_label(&request.data) {
        Ok(label) => {
            output.device_label = label;
            ParamResponse::ack_empty()
        }
        Err(reason) => ParamResponse::Nack(reason),
    }
}

fn get_software_version_label(_output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    label_response(request, concat!("strand ", env!("CARGO_PKG_VERSION")))
}

fn get_personality(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    ParamResponse::Ack(vec![
        output.personalities.active_number(),
        output.personalities.count(),
    ])
}

fn set_personality(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    if output.set_personality(u16::from(number)) {
        ParamResponse::ack_empty()
    } else {
        ParamResponse::Nack(NackReason::DataOutOfRange)
    }
}

fn get_personality_description(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let Some(personality) = output.personalities.get(number) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let mut out = Vec::new();
    out.push(number);
    pack::put_u16(&mut out, personality.footprint());
    pack::put_label(&mut out, personality.description());
    ParamResponse::Ack(out)
}

fn get_slot_info(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let mut out = Vec::new();
    for (index, slot) in output.personalities.active().slot_data().iter().enumerate() {
        pack::put_u16(&mut out, index as u16);
        out.push(slot.slot_type);
        pack::put_u16(&mut out, slot.definition);
    }
    ParamResponse::Ack(out)
}

fn get_start_address(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let mut out = Vec::with_capacity(2);
    let address = if output.personalities.active_footprint() == 0 {
        0xFFFF
    } else {
        output.start_address
    };
    pack::put_u16(&mut out, address);
    ParamResponse::Ack(out)
}

fn set_start_address(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let address = match pack::take_u16(&request.data) {
        Ok(address) => address,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    if !output.set_start_address(address) {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    }
    ParamResponse::ack_empty()
}

fn get_identify(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    ParamResponse::Ack(vec![u8::from(output.identify_mode)])
}

fn set_identify(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    match pack::take_bool(&request.data) {
        Ok(on) => {
            output.set_identify(on);
            ParamResponse::ack_empty()
        }
        Err(reason) => ParamResponse::Nack(reason),
    }
}

fn get_sensor_definition(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if output.sensors.is_empty() {
        return ParamResponse::Nack(NackReason::UnknownPid);
    }
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let Some(sensor) = output.sensors.get(usize::from(number)) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let def = sensor.definition();
    let mut out = Vec::new();
    out.push(number);
    out.push(def.kind);
    out.push(def.unit);
    out.push(def.prefix);
    pack::put_i16(&mut out, def.range.0);
    pack::put_i16(&mut out, def.range.1);
    pack::put_i16(&mut out, def.normal.0);
    pack::put_i16(&mut out, def.normal.1);
    out.push(SENSOR_RECORDED_SUPPORT);
    pack::put_label(&mut out, &def.description);
    ParamResponse::Ack(out)
}

fn get_sensor_value(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if output.sensors.is_empty() {
        return ParamResponse::Nack(NackReason::UnknownPid);
    }
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let Some(sensor) = output.sensors.get_mut(usize::from(number)) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let values = sensor.fetch();
    ParamResponse::Ack(sensor_value_payload(number, values))
}

fn set_sensor_value(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if output.sensors.is_empty() {
        return ParamResponse::Nack(NackReason::UnknownPid);
    }
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    if number == ALL_SENSORS {
        for sensor in &mut output.sensors {
            sensor.reset();
        }
        let zeroed = strand_proto::sensor::SensorValues {
            present: 0,
            lowest: 0,
            highest: 0,
            recorded: 0,
        };
        return ParamResponse::Ack(sensor_value_payload(0, zeroed));
    }
    let Some(sensor) = output.sensors.get_mut(usize::from(number)) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    sensor.reset();
    let values = sensor.fetch();
    ParamResponse::Ack(sensor_value_payload(number, values))
}

fn record_sensors(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if output.sensors.is_empty() {
        return ParamResponse::Nack(NackReason::UnknownPid);
    }
    let number = match pack::take_u8(&request.data) {
        Ok(number) => number,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    if number == ALL_SENSORS {
        for sensor in &mut output.sensors {
            sensor.record();
        }
        return ParamResponse::ack_empty();
    }
    let Some(sensor) = output.sensors.get_mut(usize::from(number)) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    sensor.record();
    ParamResponse::ack_empty()
}

fn sensor_value_payload(number: u8, values: strand_proto::sensor::SensorValues) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(number);
    pack::put_i16(&mut out, values.present);
    pack::put_i16(&mut out, values.lowest);
    pack::put_i16(&mut out, values.highest);
    pack::put_i16(&mut out, values.recorded);
    out
}

const HARDWARE_TYPE_ETHERNET: u16 = 1;

fn get_list_interfaces(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let mut out = Vec::new();
    for interface in output.network.interfaces() {
        pack::put_u32(&mut out, interface.index);
        pack::put_u16(&mut out, HARDWARE_TYPE_ETHERNET);
    }
    ParamResponse::Ack(out)
}

fn get_interface_label(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let index = match pack::take_u32(&request.data) {
        Ok(index) => index,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let Some(interface) = output
        .network
        .interfaces()
        .into_iter()
        .find(|i| i.index == index)
    else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let mut out = Vec::new();
    pack::put_u32(&mut out, index);
    pack::put_label(&mut out, &interface.name);
    ParamResponse::Ack(out)
}

fn get_interface_hardware_address(
    output: &mut PixelOutput,
    request: &ParamRequest,
) -> ParamResponse {
    let index = match pack::take_u32(&request.data) {
        Ok(index) => index,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let Some(interface) = output
        .network
        .interfaces()
        .into_iter()
        .find(|i| i.index == index)
    else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let mut out = Vec::with_capacity(10);
    pack::put_u32(&mut out, index);
    out.extend_from_slice(&interface.mac);
    ParamResponse::Ack(out)
}

fn get_ipv4_current_address(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let index = match pack::take_u32(&request.data) {
        Ok(index) => index,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    if !output
        .network
        .interfaces()
        .iter()
        .any(|i| i.index == index)
    {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    }
    let (address, prefix) = output
        .network
        .ipv4_address(index)
        .unwrap_or((std::net::Ipv4Addr::UNSPECIFIED, 0));
    let mut out = Vec::with_capacity(10);
    pack::put_u32(&mut out, index);
    pack::put_u32(&mut out, u32::from(address));
    out.push(prefix);
    out.push(0); // DHCP inactive
    ParamResponse::Ack(out)
}

fn get_ipv4_default_route(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let (index, route) = output
        .network
        .default_route()
        .unwrap_or((0, std::net::Ipv4Addr::UNSPECIFIED));
    let mut out = Vec::with_capacity(8);
    pack::put_u32(&mut out, index);
    pack::put_u32(&mut out, u32::from(route));
    ParamResponse::Ack(out)
}

fn get_dns_hostname(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let hostname = output.network.hostname().unwrap_or_default();
    label_response(request, &hostname)
}

fn get_dns_domain_name(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let domain = output.network.domain_name().unwrap_or_default();
    label_response(request, &domain)
}

fn get_dns_name_server(output: &mut PixelOutput, request: &ParamRequest) -> ParamResponse {
    let index = match pack::take_u8(&request.data) {
        Ok(index) => index,
        Err(reason) => return ParamResponse::Nack(reason),
    };
    let servers = output.network.name_servers();
    let Some(server) = servers.get(usize::from(index)) else {
        return ParamResponse::Nack(NackReason::DataOutOfRange);
    };
    let mut out = Vec::with_capacity(5);
    out.push(index);
    pack::put_u32(&mut out, u32::from(*server));
    ParamResponse::Ack(out)
}

fn label_response(request: &ParamRequest, label: &str) -> ParamResponse {
    if let Err(reason) = pack::expect_empty(&request.data) {
        return ParamResponse::Nack(reason);
    }
    let mut out = Vec::new();
    pack::put_label(&mut out, label);
    ParamResponse::Ack(out)
}
