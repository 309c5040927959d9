//text wire protocol spoken with the rover microcontroller
//
//frame format: <tag,count,v1,v2,...>   one or more per line, line ends with \r\n
//  inbound:  <ir,3,a,b,c>  <acc,3,x,y,z>  <gyr,3,x,y,z>
//  outbound: <ws,2,dl,dr>  <ss,1,deg>  <start,100>  <stop,0>

use log::warn;

//longest line accepted before the buffer is dropped
pub const MAX_LINE_LEN: usize = 256;

pub const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError{
    #[error("unterminated frame '<{0}'")]
    Unterminated(String),
    #[error("frame has no tag")]
    MissingTag,
    #[error("frame '{tag}' has invalid count '{value}'")]
    BadCount{ tag: String, value: String },
    #[error("frame '{tag}' has invalid value '{value}'")]
    BadValue{ tag: String, value: String },
    #[error("frame '{tag}' declares {declared} values but carries {actual}")]
    CountMismatch{ tag: String, declared: usize, actual: usize },
    #[error("unknown sensor tag '{0}'")]
    UnknownTag(String),
    #[error("{group:?} expects {expected} values, got {actual}")]
    ArityMismatch{ group: SensorGroup, expected: usize, actual: usize },
}

//sensor groups the firmware reports, always updated as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup{
    Ir,
    Acc,
    Gyr,
}

impl SensorGroup{
    pub fn from_tag(tag: &str) -> Option<Self>{
        match tag{
            "ir" => Some(SensorGroup::Ir),
            "acc" => Some(SensorGroup::Acc),
            "gyr" => Some(SensorGroup::Gyr),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str{
        match self{
            SensorGroup::Ir => "ir",
            SensorGroup::Acc => "acc",
            SensorGroup::Gyr => "gyr",
        }
    }

    pub fn arity(&self) -> usize{
        3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame{
    pub tag: String,
    pub count: usize,
    pub values: Vec<f64>,
}

impl Frame{
    pub fn new(tag: &str, count: usize, values: Vec<f64>) -> Self{
        Frame{ tag: tag.to_string(), count, values }
    }

    pub fn sensor_group(&self) -> Result<SensorGroup, FrameError>{
        SensorGroup::from_tag(&self.tag).ok_or_else(|| FrameError::UnknownTag(self.tag.clone()))
    }

    //values are written with Display so integral values carry no decimal point
    pub fn encode(&self) -> String{
        let mut out = format!("<{},{}", self.tag, self.count);
        for value in &self.values{
            out.push(',');
            out.push_str(&value.to_string());
        }
        out.push('>');
        out.push_str(LINE_TERMINATOR);
        out
    }
}

//actuator commands sent to the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command{
    WheelSpeeds{ left: i32, right: i32 },
    Tilt{ degrees: i32 },
    Setup{ run: bool },
}

impl Command{
    pub fn to_frame(&self) -> Frame{
        match *self{
            Command::WheelSpeeds{ left, right } => Frame::new("ws", 2, vec![left as f64, right as f64]),
            Command::Tilt{ degrees } => Frame::new("ss", 1, vec![degrees as f64]),
            Command::Setup{ run: true } => Frame::new("start", 100, Vec::new()),
            Command::Setup{ run: false } => Frame::new("stop", 0, Vec::new()),
        }
    }

    pub fn encode(&self) -> String{
        self.to_frame().encode()
    }
}

enum Scan{
    Outside,
    Inside(String),
}

//split a line into frames, one result per '<' seen
//text outside of <...> is ignored, a '<' inside a frame restarts the frame
pub fn decode_line(line: &str) -> Vec<Result<Frame, FrameError>>{
    let mut results = Vec::new();
    let mut state = Scan::Outside;

    for ch in line.chars(){
        state = match (state, ch){
            (Scan::Outside, '<') => Scan::Inside(String::new()),
            (Scan::Outside, _) => Scan::Outside,
            (Scan::Inside(partial), '<') =>{
                results.push(Err(FrameError::Unterminated(partial)));
                Scan::Inside(String::new())
            }
            (Scan::Inside(body), '>') =>{
                results.push(parse_body(&body));
                Scan::Outside
            }
            (Scan::Inside(mut body), c) =>{
                body.push(c);
                Scan::Inside(body)
            }
        };
    }

    if let Scan::Inside(partial) = state{
        results.push(Err(FrameError::Unterminated(partial)));
    }

    results
}

//frames that decoded cleanly, diagnostics for the rest go to the log
pub fn decode(line: &str) -> Vec<Frame>{
    decode_line(line)
        .into_iter()
        .filter_map(|result| match result{
            Ok(frame) => Some(frame),
            Err(e) =>{
                warn!("[protocol] dropping frame: {}", e);
                None
            }
        })
        .collect()
}

fn parse_body(body: &str) -> Result<Frame, FrameError>{
    let mut fields = body.split(',').map(str::trim);

    let tag = match fields.next(){
        Some(tag) if !tag.is_empty() => tag,
        _ => return Err(FrameError::MissingTag),
    };

    let count_field = fields.next().unwrap_or("");
    let count: usize = count_field.parse().map_err(|_| FrameError::BadCount{
        tag: tag.to_string(),
        value: count_field.to_string(),
    })?;

    let values = fields
        .map(|field| parse_value(tag, field))
        .collect::<Result<Vec<f64>, FrameError>>()?;

    if values.len() != count{
        return Err(FrameError::CountMismatch{
            tag: tag.to_string(),
            declared: count,
            actual: values.len(),
        });
    }

    Ok(Frame{ tag: tag.to_string(), count, values })
}

fn parse_value(tag: &str, field: &str) -> Result<f64, FrameError>{
    let numeric = !field.is_empty()
        && field.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));

    match field.parse::<f64>(){
        Ok(value) if numeric && value.is_finite() => Ok(value),
        _ => Err(FrameError::BadValue{ tag: tag.to_string(), value: field.to_string() }),
    }
}

//accumulates serial bytes and hands out complete lines
pub struct LineBuffer{
    buf: Vec<u8>,
}

impl LineBuffer{
    pub fn new() -> Self{
        LineBuffer{ buf: Vec::with_capacity(MAX_LINE_LEN * 2) }
    }

    pub fn extend(&mut self, data: &[u8]){
        self.buf.extend_from_slice(data);
    }

    pub fn next_line(&mut self) -> Option<String>{
        match self.buf.iter().position(|&b| b == b'\n'){
            Some(pos) =>{
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r'){
                    line.pop();
                }
                Some(String::from_utf8_lossy(&line).into_owned())
            }
            None =>{
                if self.buf.len() > MAX_LINE_LEN{
                    warn!("[protocol] discarding {} bytes without line terminator", self.buf.len());
                    self.buf.clear();
                }
                None
            }
        }
    }

    pub fn pending(&self) -> usize{
        self.buf.len()
    }
}

impl Default for LineBuffer{
    fn default() -> Self{
        Self::new()
    }
}
