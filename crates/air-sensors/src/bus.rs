use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

/// Register level access to one device on the shared bus. Every call is a
/// single blocking transaction, failures are reduced to their
/// [`ErrorKind`].
#[derive(Debug)]
pub struct Device<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Device<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, ErrorKind> {
        let [byte] = self.read_registers(register)?;
        Ok(byte)
    }

    pub fn read_registers<const N: usize>(&mut self, register: u8) -> Result<[u8; N], ErrorKind> {
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| e.kind())?;
        Ok(buf)
    }

    /// Writes `data` starting at `register`
    pub fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), ErrorKind> {
        let mut frame: heapless::Vec<u8, 16> = heapless::Vec::new();
        frame.push(register).map_err(|_| ErrorKind::Overrun)?;
        frame
            .extend_from_slice(data)
            .map_err(|_| ErrorKind::Overrun)?;
        self.write(&frame)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.i2c.write(self.address, bytes).map_err(|e| e.kind())
    }

    pub fn read<const N: usize>(&mut self) -> Result<[u8; N], ErrorKind> {
        let mut buf = [0u8; N];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|e| e.kind())?;
        Ok(buf)
    }
}
