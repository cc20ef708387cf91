// THEORY (single-pixel color heuristics):
// The `Pixel` module is the most fundamental unit of the inspection engine. It is a
// "dumb" data container for one RGB sample plus the 1-dimensional conversions the
// detectors need: Rec. 601 luma for every grayscale stage, and HSV on the 8-bit
// OpenCV scale for color classification. Nothing here looks at neighbors.
//
// Why the OpenCV scale?
// - Pin color bands are calibrated on the inspection rig with tooling that reports
//   H in 0..=179 (degrees / 2) and S, V in 0..=255. Keeping the same scale means a
//   calibrated band can be pasted into the configuration untouched.
// - Rounding follows the same convention (round-half-away-from-zero on the final
//   scaled value), so band edges behave identically.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type Luminance = f64;

    /// A hue/saturation/value triple on the 8-bit scale (H 0..=179, S and V 0..=255).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Hsv {
        pub hue: u8,
        pub saturation: u8,
        pub value: u8,
    }

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64
                + 0.587_f64 * self.green as f64
                + 0.114_f64 * self.blue as f64
        }

        /// Luma rounded back into a byte, as used for every grayscale stage.
        pub fn gray(&self) -> u8 {
            self.luminance().round().clamp(0.0, 255.0) as u8
        }

        /// Hue angle in degrees [0, 360) from normalized sRGB channels.
        pub fn hue_degrees(&self) -> Hue {
            let red = self.red as NormalizedChannel / 255.0;
            let green = self.green as NormalizedChannel / 255.0;
            let blue = self.blue as NormalizedChannel / 255.0;
            let maximum_channel = red.max(green.max(blue));
            let minimum_channel = red.min(green.min(blue));
            let chroma = maximum_channel - minimum_channel;

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == red {
                (green - blue, 0.0)
            } else if maximum_channel == green {
                (blue - red, 2.0)
            } else {
                (red - green, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// HSV on the 8-bit calibration scale.
        pub fn hsv(&self) -> Hsv {
            let maximum_channel = self.red.max(self.green.max(self.blue));
            let minimum_channel = self.red.min(self.green.min(self.blue));
            let chroma = (maximum_channel - minimum_channel) as f32;

            let saturation = if maximum_channel == 0 {
                0
            } else {
                (chroma * 255.0 / maximum_channel as f32).round() as u8
            };

            // 360 degrees folds onto 180, which wraps back to 0 like the rig tooling.
            let mut hue = (self.hue_degrees() / 2.0).round() as u16;
            if hue >= 180 {
                hue -= 180;
            }

            Hsv {
                hue: hue as u8,
                saturation,
                value: maximum_channel,
            }
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }
}
