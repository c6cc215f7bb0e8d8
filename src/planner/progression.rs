/// One of the four axes a codestream is serialized along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Layer,
    Resolution,
    Component,
    Position,
}

/// Packet ordering of a codestream, named slowest axis first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProgressionOrder {
    /// Layer-resolution-component-position: incremental quality refinement.
    #[default]
    Lrcp,
    /// Resolution-layer-component-position: progressive resolution.
    Rlcp,
    /// Resolution-position-component-layer.
    Rpcl,
    /// Position-component-resolution-layer: spatial random access.
    Pcrl,
    /// Component-position-resolution-layer: per-band access.
    Cprl,
}

impl ProgressionOrder {
    pub const ALL: [ProgressionOrder; 5] = [Self::Lrcp, Self::Rlcp, Self::Rpcl, Self::Pcrl, Self::Cprl];

    /// Code stored in the COD marker segment.
    pub fn code(self) -> u8 {
        match self {
            Self::Lrcp => 0,
            Self::Rlcp => 1,
            Self::Rpcl => 2,
            Self::Pcrl => 3,
            Self::Cprl => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Axes from slowest to fastest varying.
    pub fn axes(self) -> [Axis; 4] {
        use Axis::*;
        match self {
            Self::Lrcp => [Layer, Resolution, Component, Position],
            Self::Rlcp => [Resolution, Layer, Component, Position],
            Self::Rpcl => [Resolution, Position, Component, Layer],
            Self::Pcrl => [Position, Component, Resolution, Layer],
            Self::Cprl => [Component, Position, Resolution, Layer],
        }
    }

    pub fn is_layer_first(self) -> bool {
        self == Self::Lrcp
    }

    pub fn is_resolution_first(self) -> bool {
        matches!(self, Self::Rlcp | Self::Rpcl)
    }

    /// Orders that keep a tile's data contiguous early in the stream.
    pub fn is_position_first(self) -> bool {
        matches!(self, Self::Rpcl | Self::Pcrl)
    }

    pub fn is_component_first(self) -> bool {
        self == Self::Cprl
    }

    /// Iterate packets of a codestream with extents `dims` in this order.
    pub fn packets(self, dims: PacketDims) -> Packets {
        Packets::new(self, dims)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Lrcp => "LRCP",
            Self::Rlcp => "RLCP",
            Self::Rpcl => "RPCL",
            Self::Pcrl => "PCRL",
            Self::Cprl => "CPRL",
        }
    }
}

impl core::fmt::Display for ProgressionOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Extent of each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketDims {
    pub layers: u16,
    pub resolutions: u8,
    pub components: u16,
    pub positions: u32,
}

impl PacketDims {
    fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Layer => u32::from(self.layers),
            Axis::Resolution => u32::from(self.resolutions),
            Axis::Component => u32::from(self.components),
            Axis::Position => self.positions,
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.layers)
            * u64::from(self.resolutions)
            * u64::from(self.components)
            * u64::from(self.positions)
    }
}

/// Coordinates of one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Packet {
    pub layer: u16,
    pub resolution: u8,
    pub component: u16,
    pub position: u32,
}

/// Iterator over packets in bitstream order.
#[derive(Clone, Debug)]
pub struct Packets {
    axes: [Axis; 4],
    extents: [u32; 4],
    counters: [u32; 4],
    remaining: u64,
}

impl Packets {
    fn new(order: ProgressionOrder, dims: PacketDims) -> Self {
        let axes = order.axes();
        Self {
            axes,
            extents: axes.map(|a| dims.extent(a)),
            counters: [0; 4],
            remaining: dims.total(),
        }
    }

    fn current(&self) -> Packet {
        let mut packet = Packet {
            layer: 0,
            resolution: 0,
            component: 0,
            position: 0,
        };
        for (axis, &value) in self.axes.iter().zip(&self.counters) {
            match axis {
                Axis::Layer => packet.layer = value as u16,
                Axis::Resolution => packet.resolution = value as u8,
                Axis::Component => packet.component = value as u16,
                Axis::Position => packet.position = value,
            }
        }
        packet
    }
}

impl Iterator for Packets {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        if self.remaining == 0 {
            return None;
        }
        let packet = self.current();
        self.remaining -= 1;
        // odometer, fastest axis last
        for i in (0..4).rev() {
            self.counters[i] += 1;
            if self.counters[i] < self.extents[i] {
                break;
            }
            self.counters[i] = 0;
        }
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}
