//! Wire messages and method paths of the greeting and calculator services.

pub mod greet {
    use crate::call::CallDescriptor;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Greeting {
        #[prost(string, tag = "1")]
        pub first_name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub last_name: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetRequest {
        #[prost(message, optional, tag = "1")]
        pub greeting: ::core::option::Option<Greeting>,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetResponse {
        #[prost(string, tag = "1")]
        pub result: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetManyTimesRequest {
        #[prost(message, optional, tag = "1")]
        pub greeting: ::core::option::Option<Greeting>,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetManyTimesResponse {
        #[prost(string, tag = "1")]
        pub result: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LongGreetRequest {
        #[prost(message, optional, tag = "1")]
        pub greeting: ::core::option::Option<Greeting>,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LongGreetResponse {
        #[prost(string, tag = "1")]
        pub result: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetEveryoneRequest {
        #[prost(message, optional, tag = "1")]
        pub greeting: ::core::option::Option<Greeting>,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetEveryoneResponse {
        #[prost(string, tag = "1")]
        pub result: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetWithDeadlineRequest {
        #[prost(message, optional, tag = "1")]
        pub greeting: ::core::option::Option<Greeting>,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GreetWithDeadlineResponse {
        #[prost(string, tag = "1")]
        pub result: ::prost::alloc::string::String,
    }

    pub const GREET: CallDescriptor = CallDescriptor::unary("/greet.GreetService/Greet");
    pub const GREET_MANY_TIMES: CallDescriptor =
        CallDescriptor::server_stream("/greet.GreetService/GreetManyTimes");
    pub const LONG_GREET: CallDescriptor =
        CallDescriptor::client_stream("/greet.GreetService/LongGreet");
    pub const GREET_EVERYONE: CallDescriptor =
        CallDescriptor::bidi_stream("/greet.GreetService/GreetEveryone");
    pub const GREET_WITH_DEADLINE: CallDescriptor =
        CallDescriptor::unary("/greet.GreetService/GreetWithDeadline");
}

pub mod calculator {
    use crate::call::CallDescriptor;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SumRequest {
        #[prost(int32, tag = "1")]
        pub first_number: i32,
        #[prost(int32, tag = "2")]
        pub second_number: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SumResponse {
        #[prost(int32, tag = "1")]
        pub sum_result: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrimeNumberDecompositionRequest {
        #[prost(int64, tag = "1")]
        pub number: i64,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrimeNumberDecompositionResponse {
        #[prost(int64, tag = "1")]
        pub prime_factor: i64,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ComputeAverageRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ComputeAverageResponse {
        #[prost(double, tag = "1")]
        pub average: f64,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FindMaximumRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FindMaximumResponse {
        #[prost(int32, tag = "1")]
        pub maximum: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SquareRootRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SquareRootResponse {
        #[prost(double, tag = "1")]
        pub number_root: f64,
    }

    pub const SUM: CallDescriptor = CallDescriptor::unary("/calculator.CalculatorService/Sum");
    pub const PRIME_NUMBER_DECOMPOSITION: CallDescriptor =
        CallDescriptor::server_stream("/calculator.CalculatorService/PrimeNumberDecomposition");
    pub const COMPUTE_AVERAGE: CallDescriptor =
        CallDescriptor::client_stream("/calculator.CalculatorService/ComputeAverage");
    pub const FIND_MAXIMUM: CallDescriptor =
        CallDescriptor::bidi_stream("/calculator.CalculatorService/FindMaximum");
    /// Fails with `InvalidArgument` for negative input.
    pub const SQUARE_ROOT: CallDescriptor =
        CallDescriptor::unary("/calculator.CalculatorService/SquareRoot");
}
