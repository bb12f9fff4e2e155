use std::{io, net::TcpStream};

use crate::{
    backend::receiver_backend::GarbledNodeRecv,
    garbling::{GarbledCircuit, GarbledWire},
    message::MessageStream,
};
use protobuf::MessageField;
use protos::{GarbledCircuitSend, GarbledNodeSend, GarblerKeys, Gate, Input};

use super::receiver_backend::GarbledCircuitRecv;

include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));

// Convert a garbled node to the garbled node protobuf
impl From<GarbledNodeRecv> for GarbledNodeSend {
    fn from(value: GarbledNodeRecv) -> Self {
        let mut input_send = GarbledNodeSend::new();

        match value {
            GarbledNodeRecv::Input(idx) => {
                // Extract the input index from the message
                let mut input_msg = Input::new();
                input_msg.idx = idx as i64;
                input_send.input = MessageField::some(input_msg);

                input_send
            }
            GarbledNodeRecv::Gate(gate) => {
                // Extract the gate data
                let mut gate_msg = Gate::new();
                gate_msg.c_00 = gate.c_00().unwrap();
                gate_msg.c_01 = gate.c_01().unwrap();
                gate_msg.c_10 = gate.c_10().unwrap();
                gate_msg.c_11 = gate.c_11().unwrap();
                gate_msg.left =
                    MessageField::some(GarbledNodeSend::from(gate.left.unwrap().borrow().clone()));
                gate_msg.right = MessageField::some(GarbledNodeSend::from(
                    gate.right.unwrap().borrow().clone(),
                ));
                input_send.gate = MessageField::some(gate_msg);

                input_send
            }
        }
    }
}

/// Send the keys corresponding to our own (garbler-held) input bits to the evaluator.
/// Since the evaluator can't tell an "on" key from an "off" key, handing over the one
/// key that matches our real bit leaks nothing about its value -- the same trick used
/// for a garbler's own input in any Yao circuit, no oblivious transfer required.
pub fn send_direct_input_keys(
    stream: &mut TcpStream,
    wires: &[GarbledWire],
    bits: &[bool],
) -> Result<(), io::Error> {
    let mut keys_msg = GarblerKeys::new();
    keys_msg.keys = wires
        .iter()
        .zip(bits)
        .map(|(wire, &bit)| if bit { wire.on_key().to_vec() } else { wire.off_key().to_vec() })
        .collect();

    MessageStream::<GarblerKeys>::send_msg(stream, keys_msg)
}

/// Send the garbled circuit to the receiver
pub fn send_garbled_circuit(
    stream: &mut TcpStream,
    garbled_circuit: GarbledCircuit,
) -> Result<(), io::Error> {
    let n = garbled_circuit.n();
    // "dumb down" the circuit to a form the receiver can understand
    let recv_circuit: GarbledCircuitRecv = garbled_circuit.into();
    let out_msg: GarbledNodeSend = recv_circuit.out.into();
    // Send the garbled circuit to the receiver
    let mut garbled_circuit_msg = GarbledCircuitSend::new();
    garbled_circuit_msg.n = n as i64;
    garbled_circuit_msg.out = MessageField::some(out_msg);
    MessageStream::<GarbledCircuitSend>::send_msg(stream, garbled_circuit_msg)?;

    Ok(())
}
